mod test_support;

use serde_json::json;
use test_support::spawn_sidecar;

#[test]
fn every_method_is_routed() {
    let mut sc = spawn_sidecar();

    let health = sc.request_ok("health", json!({}));
    assert_eq!(health["schools"], 3);
    assert_eq!(health["flow"], "identifying");
    assert_eq!(health["theme"], "#4A90E2");

    let methods = [
        "seed.validate",
        "auth.requestLink",
        "auth.confirmLink",
        "auth.selectSchool",
        "auth.cancel",
        "auth.state",
        "session.get",
        "session.switchSchool",
        "session.logout",
        "dashboard.view",
        "dashboard.route",
        "dashboard.selectTab",
        "dashboard.open",
        "dashboard.back",
        "dashboard.setPane",
        "dashboard.compose",
        "notifications.list",
        "notifications.markRead",
        "notifications.markAllRead",
        "reportCards.publish",
        "reportCards.list",
        "attendance.mark",
        "grades.record",
        "assignments.add",
        "announcements.post",
        "events.add",
        "invoices.list",
        "invoices.pay",
        "messages.send",
        "messages.list",
        "messages.markRead",
        "seed.load",
    ];
    for m in methods {
        let resp = sc.request(m, json!({}));
        let code = resp["error"]["code"].as_str().unwrap_or("");
        assert_ne!(code, "not_implemented", "{} not routed", m);
    }

    assert_eq!(sc.request_err("grades.delete", json!({})), "not_implemented");
}

#[test]
fn bad_json_gets_an_error_line_and_the_loop_continues() {
    let mut sc = spawn_sidecar();
    let resp = sc.send_raw("{not json");
    assert_eq!(resp["ok"], false);
    assert_eq!(resp["error"]["code"], "bad_json");
    sc.request_ok("health", json!({}));
}

#[test]
fn commands_without_a_session_are_refused() {
    let mut sc = spawn_sidecar();
    for m in ["session.get", "dashboard.view", "notifications.list", "messages.list"] {
        assert_eq!(sc.request_err(m, json!({})), "no_session", "{}", m);
    }
    assert_eq!(sc.request_err("session.logout", json!({})), "no_session");
}
