mod test_support;

use serde_json::json;
use test_support::spawn_sidecar;

#[test]
fn single_school_email_resolves_ignoring_case_and_whitespace() {
    let mut sc = spawn_sidecar();
    let done = sc.sign_in("  Ben.Carter@LPA.EDU ");
    assert_eq!(done["flow"]["state"], "resolved");
    assert_eq!(done["flow"]["session"]["school"]["id"], "lpa");
    assert_eq!(done["flow"]["session"]["user"]["id"], 11);
    assert_eq!(done["flow"]["session"]["role"], "Student");
    assert_eq!(done["theme"], "#002D62");

    let session = sc.request_ok("session.get", json!({}));
    assert_eq!(session["dashboard"]["activeTab"], "Home");
    assert_eq!(session["schools"], json!(["lpa"]));
}

#[test]
fn unknown_email_reports_user_not_found() {
    let mut sc = spawn_sidecar();
    let resp = sc.request("auth.requestLink", json!({ "email": "nobody@nowhere.org" }));
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "user_not_found");
    assert_eq!(
        resp["error"]["message"],
        "User not found. Try the demo accounts below."
    );

    let state = sc.request_ok("auth.state", json!({}));
    assert_eq!(state["flow"]["state"], "identifying");
    assert_eq!(
        state["flow"]["error"],
        "User not found. Try the demo accounts below."
    );
    assert_eq!(sc.request_err("auth.requestLink", json!({})), "bad_params");
}

#[test]
fn multi_school_email_requires_a_choice() {
    let mut sc = spawn_sidecar();
    let pending = sc.sign_in("priya.sharma@gmail.com");
    assert_eq!(pending["flow"]["state"], "schoolSelection");
    let candidates = pending["flow"]["candidates"].as_array().expect("candidates");
    assert_eq!(candidates.len(), 2);
    assert_eq!(sc.request_err("session.get", json!({})), "no_session");

    assert_eq!(
        sc.request_err("auth.selectSchool", json!({ "index": 7 })),
        "invalid_selection"
    );
    assert_eq!(
        sc.request_err("auth.selectSchool", json!({ "schoolId": "lpa" })),
        "invalid_selection"
    );
    assert_eq!(
        sc.request_err("auth.selectSchool", json!({ "schoolId": "ea", "role": "Janitor" })),
        "unknown_role"
    );

    let ea_index = candidates
        .iter()
        .position(|c| c["schoolId"] == "ea")
        .expect("ea candidate");
    let done = sc.request_ok("auth.selectSchool", json!({ "index": ea_index }));
    assert_eq!(done["flow"]["session"]["school"]["id"], "ea");
    assert_eq!(done["theme"], "#4A90E2");
}

#[test]
fn cancel_and_stale_links() {
    let mut sc = spawn_sidecar();
    let first = sc.request_ok("auth.requestLink", json!({ "email": "dr.wallace@lpa.edu" }));
    let second = sc.request_ok("auth.requestLink", json!({ "email": "dr.wallace@lpa.edu" }));
    assert_ne!(first["linkId"], second["linkId"]);

    assert_eq!(
        sc.request_err("auth.confirmLink", json!({ "linkId": first["linkId"] })),
        "bad_params"
    );
    assert_eq!(
        sc.request_err("auth.confirmLink", json!({ "linkId": "not-a-uuid" })),
        "bad_params"
    );

    let cancelled = sc.request_ok("auth.cancel", json!({}));
    assert_eq!(cancelled["flow"]["state"], "identifying");
    assert_eq!(
        sc.request_err("auth.confirmLink", json!({ "linkId": second["linkId"] })),
        "invalid_state"
    );
    assert_eq!(sc.request_err("auth.cancel", json!({})), "invalid_state");
}

#[test]
fn signed_in_users_must_log_out_before_a_new_link() {
    let mut sc = spawn_sidecar();
    sc.sign_in("principal.lpa@lpa.edu");
    assert_eq!(
        sc.request_err("auth.requestLink", json!({ "email": "ben.carter@lpa.edu" })),
        "invalid_state"
    );
    let out = sc.request_ok("session.logout", json!({}));
    assert_eq!(out["flow"]["state"], "identifying");
    assert_eq!(out["theme"], "#4A90E2");
    sc.sign_in("ben.carter@lpa.edu");
}
