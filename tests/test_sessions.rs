//! End-to-end session tests
//!
//! Drives the registry, adapter and broker against in-memory agent processes

mod common;

use common::{
    Harness, is_permission_request, is_permission_resolved, is_turn_complete, next_input, records,
};
use kodegen_agent_sessions::store::ledger_key;
use kodegen_agent_sessions::{
    AllowRule, Cost, EditMode, ErrorKind, KeyValueStore, PermissionDecision, RequestId,
    Resolution, SessionConfig, SessionError, SessionId, SessionState, StreamEvent,
    ThinkingIntensity, ToolName,
};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

const QUIET: Duration = Duration::from_millis(200);

fn tool_results(events: &[StreamEvent]) -> Vec<&StreamEvent> {
    events
        .iter()
        .filter(|e| matches!(e, StreamEvent::ToolResult { .. }))
        .collect()
}

#[tokio::test]
async fn test_send_writes_turn_and_streams_reply() {
    let mut h = Harness::new();
    let (sid, mut agent) = h.create(SessionConfig::default());
    assert!(agent.spec().has_arg("--input-format"));
    assert_eq!(agent.spec().arg_value("--output-format"), Some("stream-json"));

    h.registry
        .send_message(Some(&sid), "hello", vec![])
        .await
        .unwrap();
    let turn = next_input(&mut agent).await;
    assert_eq!(turn["type"], "user");
    assert_eq!(turn["message"]["content"], "hello");
    assert_eq!(
        h.registry.session_summary(&sid).unwrap().state,
        SessionState::Running
    );

    agent.emit(&records::text("Hi there")).await.unwrap();
    agent.emit(&records::result(0.01)).await.unwrap();
    let events = h.until(&sid, is_turn_complete).await;

    assert_eq!(events[0], StreamEvent::UserMessage { text: "hello".into() });
    assert!(events.contains(&StreamEvent::AssistantMessage {
        text: "Hi there".into(),
        partial: false
    }));
    assert_eq!(events.last(), Some(&StreamEvent::TurnComplete { stopped: false }));

    let summary = h.registry.session_summary(&sid).unwrap();
    assert_eq!(summary.state, SessionState::Idle);
    assert_eq!(summary.name, "Agent 1");
    assert_eq!(summary.task_summary, "Hi there");
    assert_eq!(summary.cost, Cost::from_micros(10_000));
    assert!(summary.has_process);
    assert!(summary.focused);
    h.assert_gapless();
}

#[tokio::test]
async fn test_turn_carries_thinking_directive_and_attachments() {
    let mut h = Harness::new();
    let config = SessionConfig::builder()
        .name("Reviewer")
        .thinking(ThinkingIntensity::ThinkHard)
        .build();
    let (sid, mut agent) = h.create(config);

    h.registry
        .send_message(Some(&sid), "review this", vec![PathBuf::from("/tmp/a.png")])
        .await
        .unwrap();
    let turn = next_input(&mut agent).await;
    assert_eq!(
        turn["message"]["content"],
        "THINK HARD THROUGH THIS STEP BY STEP:\nreview this\n\nAttached files:\n- /tmp/a.png"
    );

    // The event carries what the user typed, not the composed turn
    let events = h.until(&sid, |_| true).await;
    assert_eq!(
        events,
        vec![StreamEvent::UserMessage {
            text: "review this".into()
        }]
    );
    assert_eq!(h.registry.session_summary(&sid).unwrap().name, "Reviewer");
}

#[tokio::test]
async fn test_denied_tool_call_never_reports_success() {
    let mut h = Harness::new();
    let (sid, mut agent) = h.create(SessionConfig::default());

    h.registry
        .send_message(Some(&sid), "delete file X", vec![])
        .await
        .unwrap();
    next_input(&mut agent).await;

    agent
        .emit(&records::tool_use("t1", "Write", json!({ "file_path": "X", "content": "" })))
        .await
        .unwrap();
    agent
        .emit(&records::can_use_tool("r1", "Write", json!({ "file_path": "X" }), "t1"))
        .await
        .unwrap();

    let events = h.until(&sid, is_permission_request).await;
    assert!(matches!(events[1], StreamEvent::ToolCall { .. }));
    assert_eq!(
        events.last(),
        Some(&StreamEvent::PermissionRequest {
            request_id: RequestId::new("r1"),
            tool_name: ToolName::new("Write"),
            preview: json!({ "file_path": "X" }),
            tool_use_id: Some("t1".into()),
        })
    );
    let summary = h.registry.session_summary(&sid).unwrap();
    assert_eq!(summary.state, SessionState::AwaitingPermission);
    assert_eq!(summary.pending_permissions, 1);

    let resolution = h
        .registry
        .resolve_permission(&sid, &RequestId::new("r1"), PermissionDecision::Denied)
        .unwrap();
    assert_eq!(resolution, Resolution::Resolved(PermissionDecision::Denied));

    let answer = next_input(&mut agent).await;
    assert_eq!(answer["type"], "control_response");
    assert_eq!(answer["response"]["request_id"], "r1");
    assert_eq!(answer["response"]["response"]["behavior"], "deny");

    // The agent's own result for the refused call is suppressed
    agent
        .emit(&records::tool_result("t1", "file written"))
        .await
        .unwrap();
    agent.emit(&records::result(0.02)).await.unwrap();
    let events = h.until(&sid, is_turn_complete).await;

    assert_eq!(
        events[0],
        StreamEvent::PermissionResolved {
            request_id: RequestId::new("r1"),
            decision: PermissionDecision::Denied,
            automatic: false,
        }
    );
    let results = tool_results(&events);
    assert_eq!(results.len(), 1);
    assert!(matches!(
        results[0],
        StreamEvent::ToolResult { tool_use_id, is_error: true, .. } if tool_use_id == "t1"
    ));
    assert_eq!(
        h.registry.session_summary(&sid).unwrap().state,
        SessionState::Idle
    );

    let again = h
        .registry
        .resolve_permission(&sid, &RequestId::new("r1"), PermissionDecision::Allowed)
        .unwrap();
    assert_eq!(again, Resolution::AlreadyResolved(PermissionDecision::Denied));
    h.assert_gapless();
}

#[tokio::test]
async fn test_allowed_tool_result_is_released() {
    let mut h = Harness::new();
    let (sid, mut agent) = h.create(SessionConfig::default());
    h.registry.send_message(None, "run tests", vec![]).await.unwrap();
    next_input(&mut agent).await;

    let input = json!({ "command": "cargo test" });
    agent
        .emit(&records::tool_use("t1", "Bash", input.clone()))
        .await
        .unwrap();
    agent
        .emit(&records::can_use_tool("r1", "Bash", input.clone(), "t1"))
        .await
        .unwrap();
    h.until(&sid, is_permission_request).await;
    assert_eq!(
        h.registry.session_summary(&sid).unwrap().task_summary,
        "Bash: cargo test"
    );

    h.registry
        .resolve_permission(&sid, &RequestId::new("r1"), PermissionDecision::Allowed)
        .unwrap();
    let answer = next_input(&mut agent).await;
    assert_eq!(answer["response"]["response"]["behavior"], "allow");
    assert_eq!(answer["response"]["response"]["updatedInput"], input);

    agent
        .emit(&records::tool_result("t1", "ok"))
        .await
        .unwrap();
    let events = h.until(&sid, |e| matches!(e, StreamEvent::ToolResult { .. })).await;
    assert_eq!(
        events.last(),
        Some(&StreamEvent::ToolResult {
            tool_use_id: "t1".into(),
            tool_name: Some(ToolName::new("Bash")),
            output: "ok".into(),
            is_error: false,
        })
    );
    assert_eq!(
        h.registry.session_summary(&sid).unwrap().state,
        SessionState::Running
    );
}

#[tokio::test]
async fn test_global_bypass_never_reaches_pending() {
    let mut h = Harness::new();
    let (sid, mut agent) = h.create(SessionConfig::default());
    h.registry.set_global_bypass(true);
    assert!(h.registry.global_bypass());

    h.registry.send_message(None, "go", vec![]).await.unwrap();
    next_input(&mut agent).await;

    for (n, tool) in ["Write", "Bash", "WebFetch"].into_iter().enumerate() {
        let input = json!({ "n": n });
        let tool_use_id = format!("t{n}");
        let request_id = format!("r{n}");
        agent
            .emit(&records::tool_use(&tool_use_id, tool, input.clone()))
            .await
            .unwrap();
        agent
            .emit(&records::can_use_tool(&request_id, tool, input, &tool_use_id))
            .await
            .unwrap();

        let events = h.until(&sid, is_permission_resolved).await;
        assert!(!events.iter().any(is_permission_request));
        assert_eq!(
            events.last(),
            Some(&StreamEvent::PermissionResolved {
                request_id: RequestId::new(request_id),
                decision: PermissionDecision::Allowed,
                automatic: true,
            })
        );
        let answer = next_input(&mut agent).await;
        assert_eq!(answer["response"]["response"]["behavior"], "allow");
    }
    assert_eq!(h.registry.session_summary(&sid).unwrap().pending_permissions, 0);
}

#[tokio::test]
async fn test_allow_rule_auto_approves_matching_command() {
    let mut h = Harness::new();
    let (sid, mut agent) = h.create(SessionConfig::default());
    assert!(h
        .registry
        .add_allow_rule(ToolName::new("Bash"), Some("npm i *".into()))
        .unwrap());
    assert!(!h
        .registry
        .add_allow_rule(ToolName::new("Bash"), Some("npm i *".into()))
        .unwrap());
    assert_eq!(
        h.registry.list_allow_rules(),
        vec![AllowRule::with_pattern("Bash", "npm i *")]
    );

    h.registry.send_message(None, "add lodash", vec![]).await.unwrap();
    next_input(&mut agent).await;

    let input = json!({ "command": "npm i lodash" });
    agent
        .emit(&records::tool_use("t1", "Bash", input.clone()))
        .await
        .unwrap();
    agent
        .emit(&records::can_use_tool("r1", "Bash", input, "t1"))
        .await
        .unwrap();

    let events = h.until(&sid, is_permission_resolved).await;
    assert!(!events.iter().any(is_permission_request));
    assert!(matches!(
        events.last(),
        Some(StreamEvent::PermissionResolved {
            decision: PermissionDecision::Allowed,
            automatic: true,
            ..
        })
    ));

    // A command outside the pattern still asks
    let input = json!({ "command": "npm publish" });
    agent
        .emit(&records::tool_use("t2", "Bash", input.clone()))
        .await
        .unwrap();
    agent
        .emit(&records::can_use_tool("r2", "Bash", input, "t2"))
        .await
        .unwrap();
    h.until(&sid, is_permission_request).await;
}

#[tokio::test]
async fn test_allowed_always_persists_a_rule() {
    let mut h = Harness::new();
    let (sid, mut agent) = h.create(SessionConfig::default());
    h.registry.send_message(None, "push", vec![]).await.unwrap();
    next_input(&mut agent).await;

    let input = json!({ "command": "git push origin main" });
    agent
        .emit(&records::tool_use("t1", "Bash", input.clone()))
        .await
        .unwrap();
    agent
        .emit(&records::can_use_tool("r1", "Bash", input, "t1"))
        .await
        .unwrap();
    h.until(&sid, is_permission_request).await;

    h.registry
        .resolve_permission(&sid, &RequestId::new("r1"), PermissionDecision::AllowedAlways)
        .unwrap();
    assert_eq!(
        h.registry.list_allow_rules(),
        vec![AllowRule::with_pattern("Bash", "git push *")]
    );

    let input = json!({ "command": "git push origin dev" });
    agent
        .emit(&records::tool_use("t2", "Bash", input.clone()))
        .await
        .unwrap();
    agent
        .emit(&records::can_use_tool("r2", "Bash", input, "t2"))
        .await
        .unwrap();
    let events = h
        .until(&sid, |e| {
            matches!(e, StreamEvent::PermissionResolved { request_id, .. } if request_id.as_str() == "r2")
        })
        .await;
    assert!(!events.iter().any(is_permission_request));
}

#[tokio::test]
async fn test_plan_mode_never_reports_mutating_results() {
    let mut h = Harness::new();
    let (sid, mut agent) = h.create(SessionConfig::builder().edit_mode(EditMode::Plan).build());

    h.registry.send_message(None, "refactor", vec![]).await.unwrap();
    let turn = next_input(&mut agent).await;
    let content = turn["message"]["content"].as_str().unwrap();
    assert!(content.starts_with("PLAN FIRST"));
    assert!(content.ends_with("refactor"));

    agent
        .emit(&records::tool_use("t1", "Write", json!({ "file_path": "a.rs" })))
        .await
        .unwrap();
    agent
        .emit(&records::can_use_tool("r1", "Write", json!({ "file_path": "a.rs" }), "t1"))
        .await
        .unwrap();
    let answer = next_input(&mut agent).await;
    assert_eq!(answer["response"]["response"]["behavior"], "deny");

    // A misbehaving agent reports results anyway
    agent
        .emit(&records::tool_result("t1", "written"))
        .await
        .unwrap();
    agent
        .emit(&records::tool_use("t2", "Bash", json!({ "command": "rm -rf target" })))
        .await
        .unwrap();
    agent
        .emit(&records::tool_result("t2", "removed"))
        .await
        .unwrap();
    agent
        .emit(&records::tool_use("t3", "Read", json!({ "file_path": "a.rs" })))
        .await
        .unwrap();
    agent
        .emit(&records::tool_result("t3", "fn main() {}"))
        .await
        .unwrap();
    agent.emit(&records::result(0.01)).await.unwrap();

    let events = h.until(&sid, is_turn_complete).await;
    assert!(!events.iter().any(is_permission_request));
    assert!(events.contains(&StreamEvent::PermissionResolved {
        request_id: RequestId::new("r1"),
        decision: PermissionDecision::Denied,
        automatic: true,
    }));

    let results = tool_results(&events);
    assert_eq!(results.len(), 3);
    for result in results {
        let StreamEvent::ToolResult {
            tool_name,
            is_error,
            output,
            ..
        } = result
        else {
            unreachable!();
        };
        match tool_name.as_ref().map(ToolName::as_str) {
            Some("Read") => {
                assert!(!*is_error);
                assert_eq!(output, "fn main() {}");
            }
            _ => assert!(*is_error, "mutating result leaked: {result:?}"),
        }
    }
}

#[tokio::test]
async fn test_edit_mode_change_applies_to_later_requests() {
    let mut h = Harness::new();
    let (sid, mut agent) = h.create(SessionConfig::default());
    h.registry.set_edit_mode(None, EditMode::Auto).unwrap();
    assert_eq!(
        h.registry.session_summary(&sid).unwrap().edit_mode,
        EditMode::Auto
    );

    agent
        .emit(&records::can_use_tool("r1", "Edit", json!({ "file_path": "b.rs" }), "t1"))
        .await
        .unwrap();
    let events = h.until(&sid, is_permission_resolved).await;
    assert!(matches!(
        events.last(),
        Some(StreamEvent::PermissionResolved {
            decision: PermissionDecision::Allowed,
            automatic: true,
            ..
        })
    ));
}

#[tokio::test]
async fn test_duplicate_request_for_same_tool_use_is_denied() {
    let mut h = Harness::new();
    let (sid, mut agent) = h.create(SessionConfig::default());

    agent
        .emit(&records::tool_use("t1", "Write", json!({})))
        .await
        .unwrap();
    agent
        .emit(&records::can_use_tool("r1", "Write", json!({}), "t1"))
        .await
        .unwrap();
    h.until(&sid, is_permission_request).await;

    agent
        .emit(&records::can_use_tool("r2", "Write", json!({}), "t1"))
        .await
        .unwrap();
    let events = h
        .until(&sid, |e| matches!(e, StreamEvent::Error { .. }))
        .await;
    assert!(matches!(
        events.last(),
        Some(StreamEvent::Error {
            kind: ErrorKind::Protocol,
            ..
        })
    ));
    let answer = next_input(&mut agent).await;
    assert_eq!(answer["response"]["request_id"], "r2");
    assert_eq!(answer["response"]["response"]["behavior"], "deny");
    assert_eq!(h.registry.session_summary(&sid).unwrap().pending_permissions, 1);
}

#[tokio::test]
async fn test_stop_denies_pending_request_and_ends_once() {
    let mut h = Harness::new();
    let (sid, mut agent) = h.create(SessionConfig::default());
    h.registry.send_message(None, "edit", vec![]).await.unwrap();
    next_input(&mut agent).await;

    agent
        .emit(&records::tool_use("t1", "Write", json!({})))
        .await
        .unwrap();
    agent
        .emit(&records::can_use_tool("r1", "Write", json!({}), "t1"))
        .await
        .unwrap();
    h.until(&sid, is_permission_request).await;

    h.registry.stop_session(Some(&sid)).await.unwrap();
    let events = h.until(&sid, is_turn_complete).await;
    assert_eq!(
        events,
        vec![
            StreamEvent::PermissionResolved {
                request_id: RequestId::new("r1"),
                decision: PermissionDecision::Denied,
                automatic: true,
            },
            StreamEvent::TurnComplete { stopped: true },
        ]
    );
    assert!(agent.was_killed());

    let summary = h.registry.session_summary(&sid).unwrap();
    assert_eq!(summary.state, SessionState::Idle);
    assert!(!summary.has_process);
    assert_eq!(summary.pending_permissions, 0);

    let err = h
        .registry
        .send_message(Some(&sid), "more", vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotRunning(_)));
    assert_eq!(
        h.registry
            .resolve_permission(&sid, &RequestId::new("r1"), PermissionDecision::Allowed)
            .unwrap(),
        Resolution::AlreadyResolved(PermissionDecision::Denied)
    );

    // A second stop is a no-op
    h.registry.stop_session(Some(&sid)).await.unwrap();
    assert!(h.settle(QUIET).await.is_empty());
    h.assert_gapless();
}

#[tokio::test]
async fn test_stop_racing_send_emits_one_terminal_event() {
    let mut h = Harness::new();
    let (sid, _agent) = h.create(SessionConfig::default());

    let registry = h.registry.clone();
    let (sent, stopped) = tokio::join!(
        registry.send_message(Some(&sid), "hi", vec![]),
        registry.stop_session(Some(&sid)),
    );
    stopped.unwrap();
    if let Err(e) = sent {
        assert!(matches!(e, SessionError::NotRunning(_)));
    }

    let events = h.settle(QUIET).await;
    let terminal = events
        .iter()
        .filter(|e| {
            matches!(
                e.event,
                StreamEvent::TurnComplete { .. } | StreamEvent::Error { .. }
            )
        })
        .count();
    assert_eq!(terminal, 1);
}

#[tokio::test]
async fn test_process_exit_moves_session_to_error() {
    let mut h = Harness::new();
    let (sid, mut agent) = h.create(SessionConfig::default());

    agent
        .emit(&records::tool_use("t1", "Bash", json!({ "command": "make" })))
        .await
        .unwrap();
    agent
        .emit(&records::can_use_tool("r1", "Bash", json!({ "command": "make" }), "t1"))
        .await
        .unwrap();
    h.until(&sid, is_permission_request).await;

    agent.exit(1);
    let events = h
        .until(&sid, |e| matches!(e, StreamEvent::Error { .. }))
        .await;
    assert_eq!(
        events[0],
        StreamEvent::PermissionResolved {
            request_id: RequestId::new("r1"),
            decision: PermissionDecision::Denied,
            automatic: true,
        }
    );
    assert!(matches!(
        events.last(),
        Some(StreamEvent::Error {
            kind: ErrorKind::ProcessExit,
            ..
        })
    ));

    let summary = h.registry.session_summary(&sid).unwrap();
    assert_eq!(summary.state, SessionState::Error);
    assert!(!summary.has_process);
    let err = h
        .registry
        .send_message(Some(&sid), "hello?", vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotRunning(_)));

    // Stopping a dead session adds nothing
    h.registry.stop_session(Some(&sid)).await.unwrap();
    assert!(h.settle(QUIET).await.is_empty());
    h.registry.close_session(&sid).await.unwrap();
}

#[tokio::test]
async fn test_spawn_failure_registers_errored_session() {
    let mut h = Harness::new();
    h.launcher.fail_launches(Some("claude: command not found"));

    let sid = h.registry.create_session(SessionConfig::default());
    let event = h.next_event().await;
    assert_eq!(event.session_id, sid);
    assert_eq!(event.seq, 0);
    assert!(matches!(
        event.event,
        StreamEvent::Error { kind: ErrorKind::SpawnFailed, ref detail } if detail.contains("not found")
    ));

    let summary = h.registry.session_summary(&sid).unwrap();
    assert_eq!(summary.state, SessionState::Error);
    assert!(!summary.has_process);
    assert!(matches!(
        h.registry.send_message(None, "hi", vec![]).await,
        Err(SessionError::NotRunning(_))
    ));

    h.registry.close_session(&sid).await.unwrap();
    assert!(h.registry.list_sessions().is_empty());
}

#[tokio::test]
async fn test_malformed_line_does_not_end_session() {
    let mut h = Harness::new();
    let (sid, mut agent) = h.create(SessionConfig::default());

    agent.emit_raw("{this is not json").await.unwrap();
    agent.emit(&records::text("still alive")).await.unwrap();

    let events = h
        .until(&sid, |e| matches!(e, StreamEvent::AssistantMessage { .. }))
        .await;
    assert!(matches!(
        events[0],
        StreamEvent::Error {
            kind: ErrorKind::Protocol,
            ..
        }
    ));
    assert_eq!(
        events[1],
        StreamEvent::AssistantMessage {
            text: "still alive".into(),
            partial: false
        }
    );
    assert_ne!(
        h.registry.session_summary(&sid).unwrap().state,
        SessionState::Error
    );
}

#[tokio::test]
async fn test_unusable_cost_does_not_stall_the_session() {
    let mut h = Harness::new();
    let (sid, mut agent) = h.create(SessionConfig::default());
    h.registry.send_message(None, "go", vec![]).await.unwrap();
    next_input(&mut agent).await;

    agent
        .emit(&json!({
            "type": "result",
            "subtype": "success",
            "total_cost_usd": "1e2147483647",
            "usage": { "input_tokens": -1 }
        }))
        .await
        .unwrap();
    let events = h.until(&sid, is_turn_complete).await;
    assert!(events.iter().any(|e| matches!(
        e,
        StreamEvent::Error {
            kind: ErrorKind::Protocol,
            ..
        }
    )));
    assert_eq!(events.last(), Some(&StreamEvent::TurnComplete { stopped: false }));

    let summary = h.registry.session_summary(&sid).unwrap();
    assert_eq!(summary.state, SessionState::Idle);
    assert_eq!(summary.cost, Cost::ZERO);

    agent.emit(&records::text("still alive")).await.unwrap();
    let events = h
        .until(&sid, |e| matches!(e, StreamEvent::AssistantMessage { .. }))
        .await;
    assert_eq!(
        events,
        vec![StreamEvent::AssistantMessage {
            text: "still alive".into(),
            partial: false
        }]
    );
    h.assert_gapless();
}

#[tokio::test]
async fn test_cumulative_cost_becomes_deltas_and_ledger() {
    let mut h = Harness::new();
    let (sid, mut agent) = h.create(SessionConfig::default());

    agent.emit(&records::result(0.10)).await.unwrap();
    agent.emit(&records::result(0.25)).await.unwrap();
    let mut deltas = Vec::new();
    while deltas.len() < 2 {
        for event in h.until(&sid, is_turn_complete).await {
            if let StreamEvent::UsageUpdate { cost_delta, .. } = event {
                deltas.push(cost_delta);
            }
        }
    }
    assert_eq!(
        deltas,
        vec![Cost::from_micros(100_000), Cost::from_micros(150_000)]
    );

    let summary = h.registry.session_summary(&sid).unwrap();
    assert_eq!(summary.cost, Cost::from_micros(250_000));
    assert_eq!(summary.cost.display_usd(), "$0.25");

    let key = ledger_key(sid.as_str());
    let ledger = h
        .stored(&key, |v| v.is_some_and(|l| l["cost"] == "0.25"))
        .await
        .unwrap();
    assert_eq!(ledger["tokens"]["input_tokens"], 20);

    // Closing the session prunes its ledger
    h.registry.close_session(&sid).await.unwrap();
    assert_eq!(h.store.get(&key).unwrap(), None);
}

#[tokio::test]
async fn test_two_sessions_are_independent() {
    let mut h = Harness::new();
    let (s1, mut a1) = h.create(SessionConfig::default());
    let (s2, mut a2) = h.create(SessionConfig::default());
    assert_eq!(h.registry.focused_session(), Some(s2.clone()));

    let registry = h.registry.clone();
    let (r1, r2) = tokio::join!(
        registry.send_message(Some(&s1), "first", vec![]),
        registry.send_message(None, "second", vec![]),
    );
    r1.unwrap();
    r2.unwrap();
    assert_eq!(next_input(&mut a1).await["message"]["content"], "first");
    assert_eq!(next_input(&mut a2).await["message"]["content"], "second");

    a1.emit(&records::text("one")).await.unwrap();
    a2.emit(&records::text("two")).await.unwrap();
    a1.emit(&records::result(0.01)).await.unwrap();
    a2.emit(&records::result(0.02)).await.unwrap();

    let mut done = (false, false);
    while !(done.0 && done.1) {
        let event = h.next_event().await;
        if let StreamEvent::AssistantMessage { text, .. } = &event.event {
            let expected = if event.session_id == s1 { "one" } else { "two" };
            assert_eq!(text, expected);
        }
        if is_turn_complete(&event.event) {
            if event.session_id == s1 {
                done.0 = true;
            } else {
                done.1 = true;
            }
        }
    }

    h.registry.close_session(&s1).await.unwrap();
    let closing = h.until(&s1, is_turn_complete).await;
    assert_eq!(closing, vec![StreamEvent::TurnComplete { stopped: true }]);
    assert!(matches!(
        h.registry.session_summary(&s1),
        Err(SessionError::UnknownSession(_))
    ));

    a2.emit(&records::text("still here")).await.unwrap();
    let events = h
        .until(&s2, |e| matches!(e, StreamEvent::AssistantMessage { .. }))
        .await;
    assert_eq!(
        events,
        vec![StreamEvent::AssistantMessage {
            text: "still here".into(),
            partial: false
        }]
    );

    let sessions = h.registry.list_sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].session_id, s2);
    assert!(sessions[0].focused);
    h.assert_gapless();
}

#[tokio::test]
async fn test_focus_moves_to_neighbour_on_close() {
    let mut h = Harness::new();
    let (a, _pa) = h.create(SessionConfig::default());
    let (b, _pb) = h.create(SessionConfig::default());
    let (c, _pc) = h.create(SessionConfig::default());

    let names: Vec<String> = h.registry.list_sessions().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["Agent 1", "Agent 2", "Agent 3"]);

    h.registry.focus_session(&b).unwrap();
    h.registry.close_session(&b).await.unwrap();
    assert_eq!(h.registry.focused_session(), Some(c.clone()));

    h.registry.close_session(&c).await.unwrap();
    assert_eq!(h.registry.focused_session(), Some(a.clone()));

    h.registry.close_session(&a).await.unwrap();
    assert_eq!(h.registry.focused_session(), None);
    assert!(matches!(
        h.registry.send_message(None, "anyone?", vec![]).await,
        Err(SessionError::NoFocusedSession)
    ));
}

#[tokio::test]
async fn test_unknown_session_is_reported() {
    let h = Harness::new();
    let ghost = SessionId::new("ghost");

    assert!(matches!(
        h.registry.send_message(Some(&ghost), "hi", vec![]).await,
        Err(SessionError::UnknownSession(_))
    ));
    assert!(matches!(
        h.registry.focus_session(&ghost),
        Err(SessionError::UnknownSession(_))
    ));
    assert!(matches!(
        h.registry.close_session(&ghost).await,
        Err(SessionError::UnknownSession(_))
    ));
    assert!(matches!(
        h.registry
            .resolve_permission(&ghost, &RequestId::new("r1"), PermissionDecision::Allowed),
        Err(SessionError::UnknownSession(_))
    ));
    assert!(matches!(
        h.registry.stop_session(None).await,
        Err(SessionError::NoFocusedSession)
    ));
}

#[tokio::test]
async fn test_unknown_request_is_reported() {
    let mut h = Harness::new();
    let (sid, _agent) = h.create(SessionConfig::default());
    assert!(matches!(
        h.registry
            .resolve_permission(&sid, &RequestId::new("never"), PermissionDecision::Allowed),
        Err(SessionError::UnknownRequest { .. })
    ));
}

#[tokio::test]
async fn test_shutdown_closes_every_session() {
    let mut h = Harness::new();
    let (s1, a1) = h.create(SessionConfig::default());
    let (s2, a2) = h.create(SessionConfig::default());

    h.registry.shutdown().await;
    assert!(h.registry.list_sessions().is_empty());
    assert!(a1.was_killed());
    assert!(a2.was_killed());

    let events = h.settle(QUIET).await;
    for sid in [&s1, &s2] {
        let terminal: Vec<_> = events
            .iter()
            .filter(|e| &e.session_id == sid)
            .map(|e| &e.event)
            .collect();
        assert_eq!(terminal, vec![&StreamEvent::TurnComplete { stopped: true }]);
    }
}
