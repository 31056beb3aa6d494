//! End-to-end renderer tests: parse, approval round-trip, hydration,
//! and live signal flow, with the host side simulated inline.

use serde_json::json;
use vellum_api::{SandboxInbound, SandboxOutbound, SpecReview};
use vellum_renderer::signals::{Batch, SignalValue};
use vellum_renderer::{standard_registry, RenderPhase, Renderer};

fn renderer() -> Renderer {
    Renderer::new(standard_registry().unwrap())
}

/// Pull the pending approval request out of the outbox.
fn pre_hydrate(renderer: &mut Renderer) -> (u64, Vec<SpecReview>) {
    renderer
        .drain_outbox()
        .into_iter()
        .find_map(|msg| match msg {
            SandboxOutbound::SandboxedPreHydrateMessage {
                transaction_id,
                specs,
            } => Some((transaction_id, specs)),
            _ => None,
        })
        .expect("render should request approval")
}

fn approve_all(renderer: &mut Renderer) {
    let (transaction_id, specs) = pre_hydrate(renderer);
    renderer.handle_message(SandboxInbound::SandboxApproval {
        transaction_id,
        specs,
    });
}

const SLIDER_DOC: &str = r#"# Demo

Move the slider.

```variables
[{"variableId": "x", "type": "number", "initialValue": 5},
 {"variableId": "y", "type": "number",
  "calculation": {"expression": "x * 2"}}]
```

```slider
{"variableId": "x", "min": 0, "max": 10}
```
"#;

#[test]
fn declared_initial_value_wins_and_feeds_the_brain() {
    let mut renderer = renderer();
    renderer.render(SLIDER_DOC);
    assert_eq!(renderer.phase(), RenderPhase::AwaitingApproval);

    approve_all(&mut renderer);
    assert_eq!(renderer.phase(), RenderPhase::Listening);
    assert!(renderer.issues().is_empty());

    // The declaration's 5 outranks the slider's min-derived default.
    assert_eq!(renderer.signal_value("x").unwrap().value, json!(5));
    assert_eq!(renderer.signal_value("y").unwrap().value, json!(10.0));

    // The initial delivery reached the control.
    let slider = &renderer.instances()[0];
    assert_eq!(slider.current_signal_value().unwrap().value, json!(5));
}

#[test]
fn user_gesture_propagates_through_derived_variables() {
    let mut renderer = renderer();
    renderer.render(SLIDER_DOC);
    approve_all(&mut renderer);

    let mut batch = Batch::new();
    batch.insert("x".into(), SignalValue::scalar(json!(7)));
    renderer.broadcast_from("slider-0", batch);

    assert_eq!(renderer.signal_value("x").unwrap().value, json!(7));
    assert_eq!(renderer.signal_value("y").unwrap().value, json!(14.0));
}

#[test]
fn stale_approval_is_discarded() {
    let mut renderer = renderer();
    renderer.render(SLIDER_DOC);
    let (first_id, first_specs) = pre_hydrate(&mut renderer);

    // A second render supersedes the first transaction.
    renderer.render(SLIDER_DOC);
    let (second_id, second_specs) = pre_hydrate(&mut renderer);
    assert!(second_id > first_id);

    renderer.handle_message(SandboxInbound::SandboxApproval {
        transaction_id: first_id,
        specs: first_specs,
    });
    assert_eq!(renderer.phase(), RenderPhase::AwaitingApproval);
    assert!(renderer.instances().is_empty());

    renderer.handle_message(SandboxInbound::SandboxApproval {
        transaction_id: second_id,
        specs: second_specs,
    });
    assert_eq!(renderer.phase(), RenderPhase::Listening);
    assert_eq!(renderer.instances().len(), 1);
}

#[test]
fn blocked_spec_renders_a_notice_instead_of_hydrating() {
    let mut renderer = renderer();
    renderer.render(SLIDER_DOC);
    let (transaction_id, mut specs) = pre_hydrate(&mut renderer);
    for review in &mut specs {
        if review.plugin_name == "slider" {
            review.block("sliders are not allowed here");
        }
    }
    renderer.handle_message(SandboxInbound::SandboxApproval {
        transaction_id,
        specs,
    });

    assert_eq!(renderer.phase(), RenderPhase::Listening);
    assert!(renderer.instances().is_empty());
    let html = renderer.html();
    assert!(html.contains("vellum-blocked"));
    assert!(html.contains("blocked: sliders are not allowed here"));
    // The blocked payload itself is gone from the output.
    assert!(!html.contains("max"));
}

#[test]
fn unanswered_proposals_are_blocked_not_silent() {
    let mut renderer = renderer();
    renderer.render(SLIDER_DOC);
    let (transaction_id, specs) = pre_hydrate(&mut renderer);
    // The host answers for the variables fence but drops the slider.
    let specs: Vec<SpecReview> = specs
        .into_iter()
        .filter(|review| review.plugin_name != "slider")
        .collect();
    renderer.handle_message(SandboxInbound::SandboxApproval {
        transaction_id,
        specs,
    });

    assert_eq!(renderer.phase(), RenderPhase::Listening);
    assert!(renderer.instances().is_empty());
    let html = renderer.html();
    assert!(html.contains("vellum-blocked"));
    assert!(html.contains("blocked: no decision returned"));
}

#[test]
fn hydration_errors_carry_the_fence_index() {
    let mut renderer = renderer();
    renderer.render(
        "```image\n{\"url\": \"https://example.com/a.png\"}\n```\n\n```image\n{\"url\": 5}\n```\n",
    );
    let (transaction_id, mut specs) = pre_hydrate(&mut renderer);
    for review in &mut specs {
        if review.container_id == "image-0" {
            review.block("first image not wanted");
        }
    }
    renderer.handle_message(SandboxInbound::SandboxApproval {
        transaction_id,
        specs,
    });

    // The failing fence is the second image in the document, and the
    // blocked sibling does not shift its attribution.
    let issue = renderer
        .issues()
        .iter()
        .find(|issue| issue.plugin_name == "image")
        .expect("malformed image spec should report");
    assert_eq!(issue.index, 1);
    assert_eq!(issue.container_id.as_deref(), Some("image-1"));
}

#[test]
fn approval_cannot_introduce_unproposed_content() {
    let mut renderer = renderer();
    renderer.render(SLIDER_DOC);
    let (transaction_id, mut specs) = pre_hydrate(&mut renderer);
    specs.push(SpecReview::approved(
        "checkbox",
        "checkbox-0",
        json!({"type": "checkbox", "variableId": "smuggled"}),
    ));
    renderer.handle_message(SandboxInbound::SandboxApproval {
        transaction_id,
        specs,
    });

    assert_eq!(renderer.instances().len(), 1);
    assert_eq!(renderer.instances()[0].id(), "slider-0");
    assert!(renderer.signal_value("smuggled").is_none());
}

#[test]
fn inline_data_loader_feeds_a_derived_frame() {
    let mut renderer = renderer();
    renderer.render(
        r#"```variables
[{"variableId": "threshold", "type": "number", "initialValue": 10},
 {"variableId": "big", "type": "object", "isArray": true,
  "calculation": {"sourceNames": ["sales"],
                  "transformations": [{"type": "filter",
                                       "expr": "datum.amount > threshold"}]}}]
```

```data
{"type": "inline", "dataSourceName": "sales",
 "content": [{"amount": 5}, {"amount": 50}]}
```
"#,
    );
    approve_all(&mut renderer);

    assert!(renderer.issues().is_empty());
    let sales = renderer.signal_value("sales").unwrap();
    assert!(sales.is_data);
    let big = renderer.signal_value("big").unwrap();
    assert!(big.is_data);
    assert_eq!(big.value, json!([{"amount": 50}]));
}

#[test]
fn url_loader_goes_through_the_guarded_fetch_protocol() {
    let mut renderer = renderer();
    renderer.render(
        r#"```data
{"type": "url", "dataSourceName": "remote", "format": "csv",
 "url": "https://example.com/rows.csv"}
```
"#,
    );
    let (transaction_id, specs) = pre_hydrate(&mut renderer);
    renderer.handle_message(SandboxInbound::SandboxApproval {
        transaction_id,
        specs,
    });

    let request_id = renderer
        .drain_outbox()
        .into_iter()
        .find_map(|msg| match msg {
            SandboxOutbound::GuardedFetchRequest {
                request_id, url, ..
            } => {
                assert_eq!(url, "https://example.com/rows.csv");
                Some(request_id)
            }
            _ => None,
        })
        .expect("url loader should request a guarded fetch");

    renderer.handle_message(SandboxInbound::GuardedFetchResponse {
        request_id,
        status: 200,
        body: Some("name,amount\nwidget,3\n".to_string()),
        error: None,
    });
    let remote = renderer.signal_value("remote").unwrap();
    assert!(remote.is_data);
    assert_eq!(remote.value, json!([{"name": "widget", "amount": 3.0}]));
}

#[test]
fn failed_fetch_is_an_issue_not_a_crash() {
    let mut renderer = renderer();
    renderer.render(
        r#"```data
{"type": "url", "dataSourceName": "remote", "url": "https://example.com/x"}
```
"#,
    );
    approve_all(&mut renderer);
    let request_id = renderer
        .drain_outbox()
        .into_iter()
        .find_map(|msg| match msg {
            SandboxOutbound::GuardedFetchRequest { request_id, .. } => Some(request_id),
            _ => None,
        })
        .unwrap();

    renderer.handle_message(SandboxInbound::GuardedFetchResponse {
        request_id,
        status: 403,
        body: None,
        error: None,
    });
    assert!(renderer.signal_value("remote").is_none());
    assert!(renderer
        .issues()
        .iter()
        .any(|issue| issue.message.contains("403")));
}

#[test]
fn vega_lite_compiles_and_hands_off_to_vega() {
    let mut renderer = renderer();
    renderer.render(
        r#"```vega-lite
{"$schema": "https://vega.github.io/schema/vega-lite/v5.json",
 "data": {"values": [{"a": 1}]},
 "params": [{"name": "sel", "value": 2}],
 "mark": "bar"}
```
"#,
    );
    approve_all(&mut renderer);

    assert!(renderer.issues().is_empty());
    // The chart instance comes from the vega plugin's hand-off.
    assert_eq!(renderer.instances().len(), 1);
    assert_eq!(renderer.signal_value("sel").unwrap().value, json!(2));
}
