mod common;

use common::{paper, seed, str_of, Sidecar, SEMESTER, SESSION};
use serde_json::json;

fn member_ids(view: &serde_json::Value) -> Vec<String> {
    view["members"]
        .as_array()
        .expect("members")
        .iter()
        .map(|m| str_of(m, "teacherId").to_string())
        .collect()
}

#[test]
fn chairman_forms_and_replaces_membership() {
    let mut sc = Sidecar::with_workspace("curriculumd-committee-form");
    let fx = seed(&mut sc);
    let chair = fx.chair.user_id.clone();

    let formed = sc.ok(
        Some(&chair),
        "committees.form",
        json!({
            "departmentId": fx.department_id,
            "session": SESSION,
            "semester": "II",
            "memberIds": [fx.member.teacher_id, fx.outsider.teacher_id, fx.member.teacher_id]
        }),
    );
    assert_eq!(formed["chairman"]["teacherId"], json!(fx.chair.teacher_id));
    let mut ids = member_ids(&formed);
    ids.sort();
    let mut expected = vec![fx.member.teacher_id.clone(), fx.outsider.teacher_id.clone()];
    expected.sort();
    assert_eq!(ids, expected);
    let id = str_of(&formed, "id").to_string();

    let updated = sc.ok(
        Some(&chair),
        "committees.update",
        json!({ "id": id, "session": SESSION, "semester": "II", "memberIds": [fx.owner.teacher_id] }),
    );
    assert_eq!(member_ids(&updated), vec![fx.owner.teacher_id.clone()]);

    let opened = sc.ok(Some(&chair), "committees.open", json!({ "id": id }));
    assert_eq!(opened, updated);

    let listed = sc.ok(Some(&fx.owner.user_id), "committees.list", json!({ "semester": "II" }));
    assert_eq!(listed.as_array().map(|a| a.len()), Some(1));
}

#[test]
fn committee_rules_reject_bad_requests() {
    let mut sc = Sidecar::with_workspace("curriculumd-committee-rules");
    let fx = seed(&mut sc);

    assert_eq!(
        sc.fail_code(
            Some(&fx.member.user_id),
            "committees.form",
            json!({ "departmentId": fx.department_id, "session": SESSION, "semester": SEMESTER, "memberIds": [fx.owner.teacher_id] }),
        ),
        "forbidden"
    );
    let err = sc.fail(
        Some(&fx.chair.user_id),
        "committees.form",
        json!({ "departmentId": fx.department_id, "session": SESSION, "semester": SEMESTER, "memberIds": [] }),
    );
    assert_eq!(err["code"], json!("bad_params"));
    assert_eq!(err["details"]["field"], json!("memberIds"));
    assert_eq!(
        sc.fail_code(
            Some(&fx.chair.user_id),
            "committees.form",
            json!({ "departmentId": fx.department_id, "session": SESSION, "semester": SEMESTER, "memberIds": ["ghost"] }),
        ),
        "integrity"
    );
    assert_eq!(
        sc.fail_code(
            Some(&fx.member.user_id),
            "committees.update",
            json!({ "id": fx.committee_id, "session": SESSION, "semester": SEMESTER, "memberIds": [fx.member.teacher_id] }),
        ),
        "forbidden"
    );
}

#[test]
fn dissolving_detaches_papers() {
    let mut sc = Sidecar::with_workspace("curriculumd-committee-dissolve");
    let fx = seed(&mut sc);
    let created = sc.ok(
        Some(&fx.owner.user_id),
        "examQuestions.create",
        paper(&fx, Some(&fx.committee_id)),
    );
    let id = str_of(&created, "id").to_string();

    sc.ok(Some(&fx.chair.user_id), "committees.dissolve", json!({ "id": fx.committee_id }));
    assert_eq!(
        sc.fail_code(Some(&fx.chair.user_id), "committees.open", json!({ "id": fx.committee_id })),
        "not_found"
    );

    let detached = sc.ok(Some(&fx.owner.user_id), "examQuestions.open", json!({ "id": id }));
    assert_eq!(detached["moderationCommitteeId"], serde_json::Value::Null);
    assert_eq!(
        sc.fail_code(Some(&fx.owner.user_id), "examQuestions.submit", json!({ "id": id })),
        "committee_required"
    );
}

#[test]
fn dissolving_returns_papers_under_review_to_their_author() {
    let mut sc = Sidecar::with_workspace("curriculumd-committee-dissolve-review");
    let fx = seed(&mut sc);
    let submitted = sc.ok(
        Some(&fx.owner.user_id),
        "examQuestions.create",
        paper(&fx, Some(&fx.committee_id)),
    );
    let submitted = str_of(&submitted, "id").to_string();
    sc.ok(Some(&fx.owner.user_id), "examQuestions.submit", json!({ "id": submitted }));
    let moderating = sc.ok(
        Some(&fx.owner.user_id),
        "examQuestions.create",
        paper(&fx, Some(&fx.committee_id)),
    );
    let moderating = str_of(&moderating, "id").to_string();
    sc.ok(Some(&fx.owner.user_id), "examQuestions.submit", json!({ "id": moderating }));
    sc.ok(Some(&fx.member.user_id), "examQuestions.startReview", json!({ "id": moderating }));

    sc.ok(Some(&fx.chair.user_id), "committees.dissolve", json!({ "id": fx.committee_id }));

    for id in [&submitted, &moderating] {
        let view = sc.ok(Some(&fx.owner.user_id), "examQuestions.open", json!({ "id": id }));
        assert_eq!(view["status"], "revision_needed");
        assert_eq!(view["moderationCommitteeId"], serde_json::Value::Null);
        let feedback = view["moderatorFeedback"].as_str().expect("feedback");
        assert!(feedback.contains("dissolved"), "{}", feedback);
        assert!(feedback.contains("Dr. Chair"), "{}", feedback);
    }

    let replacement = sc.ok(
        Some(&fx.chair.user_id),
        "committees.form",
        json!({ "departmentId": fx.department_id, "session": SESSION, "semester": SEMESTER, "memberIds": [fx.member.teacher_id] }),
    );
    let replacement = str_of(&replacement, "id").to_string();
    let mut edit = paper(&fx, Some(&replacement));
    edit["id"] = json!(submitted);
    let edited = sc.ok(Some(&fx.owner.user_id), "examQuestions.update", edit);
    assert_eq!(edited["status"], "draft");
    let resubmitted = sc.ok(Some(&fx.owner.user_id), "examQuestions.submit", json!({ "id": submitted }));
    assert_eq!(resubmitted["status"], "submitted");
    let approved = sc.ok(Some(&fx.member.user_id), "examQuestions.approve", json!({ "id": submitted }));
    assert_eq!(approved["status"], "approved");

    sc.ok(Some(&fx.owner.user_id), "examQuestions.delete", json!({ "id": moderating }));
}
