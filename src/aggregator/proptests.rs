//! Property-based tests for the aggregator
//!
//! These tests verify turn invariants hold across generated frame sequences.

use super::*;
use crate::codec::{decode, Frame, StreamEvent};
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Test Helpers
// ============================================================================

/// One logical piece of a turn body
#[derive(Debug, Clone)]
enum BodyItem {
    Chunk(String),
    Thought(String),
    Tool {
        arg_chunks: Vec<String>,
        full_args: bool,
        observed: bool,
        success: bool,
    },
}

fn tool_name(index: usize) -> String {
    format!("tool_{index}")
}

/// Expand body items into events. Tool names are unique per invocation.
fn body_events(items: &[BodyItem]) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    for (index, item) in items.iter().enumerate() {
        match item {
            BodyItem::Chunk(text) => events.push(StreamEvent::Chunk {
                content: text.clone(),
            }),
            BodyItem::Thought(text) => events.push(StreamEvent::Thought {
                content: text.clone(),
                step: Some(index as u64),
            }),
            BodyItem::Tool {
                arg_chunks,
                full_args,
                observed,
                success,
            } => {
                let tool = tool_name(index);
                events.push(StreamEvent::Action {
                    tool: tool.clone(),
                    args: None,
                    step: None,
                });
                for chunk in arg_chunks {
                    events.push(StreamEvent::ActionArgsChunk {
                        tool: tool.clone(),
                        partial_args: chunk.clone(),
                        step: None,
                    });
                }
                if *full_args {
                    events.push(StreamEvent::Action {
                        tool: tool.clone(),
                        args: Some(json!({ "n": index })),
                        step: None,
                    });
                }
                if *observed {
                    events.push(StreamEvent::Observation {
                        content: format!("result {index}"),
                        success: *success,
                        step: None,
                    });
                }
            }
        }
    }
    events
}

fn bracketed(items: &[BodyItem]) -> Vec<StreamEvent> {
    let mut events = vec![StreamEvent::Start { message_id: None }];
    events.extend(body_events(items));
    events.push(StreamEvent::End { message_id: None });
    events
}

fn expected_text(items: &[BodyItem]) -> String {
    items
        .iter()
        .filter_map(|item| match item {
            BodyItem::Chunk(text) | BodyItem::Thought(text) => Some(text.as_str()),
            BodyItem::Tool { .. } => None,
        })
        .collect()
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_body_item() -> impl Strategy<Value = BodyItem> {
    prop_oneof![
        "[a-zA-Z0-9 ]{0,12}".prop_map(BodyItem::Chunk),
        "[a-z ]{1,12}".prop_map(BodyItem::Thought),
        (
            proptest::collection::vec("[a-z{}:\" ]{0,6}", 0..4),
            any::<bool>(),
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(|(arg_chunks, full_args, observed, success)| BodyItem::Tool {
                arg_chunks,
                full_args,
                observed,
                success,
            }),
    ]
}

fn arb_body() -> impl Strategy<Value = Vec<BodyItem>> {
    proptest::collection::vec(arb_body_item(), 0..12)
}

/// Bodies whose tool calls all receive an observation
fn arb_closed_body() -> impl Strategy<Value = Vec<BodyItem>> {
    arb_body().prop_map(|items| {
        items
            .into_iter()
            .map(|item| match item {
                BodyItem::Tool {
                    arg_chunks,
                    full_args,
                    success,
                    ..
                } => BodyItem::Tool {
                    arg_chunks,
                    full_args,
                    observed: true,
                    success,
                },
                other => other,
            })
            .collect()
    })
}

fn arb_frame() -> impl Strategy<Value = Frame> {
    let text = proptest::option::of("[a-zA-Z0-9 ]{0,10}");
    let step = proptest::option::of(0u64..50);
    prop_oneof![
        proptest::option::of("[a-z0-9-]{1,8}").prop_map(|message_id| Frame::Start { message_id }),
        text.clone().prop_map(|content| Frame::Chunk { content }),
        (text.clone(), step.clone()).prop_map(|(content, step)| Frame::Thought { content, step }),
        ("[a-z_]{1,10}", step.clone()).prop_map(|(tool, step)| Frame::Action {
            tool,
            args: Some(json!({ "path": "a.txt" })),
            step,
        }),
        ("[a-z_]{1,10}", text.clone(), step.clone()).prop_map(|(tool, partial_args, step)| {
            Frame::ActionArgsChunk {
                tool,
                partial_args,
                step,
            }
        }),
        (text.clone(), proptest::option::of(any::<bool>()), step).prop_map(
            |(content, success, step)| Frame::Observation {
                content,
                success,
                step,
            }
        ),
        Just(Frame::End { message_id: None }),
        text.prop_map(|content| Frame::Error { content }),
        Just(Frame::UserMessageSaved { message_id: None }),
    ]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_tool_order_and_completion(items in arb_body()) {
        let (turn, _) = replay(bracketed(&items));
        let turn = turn.unwrap();

        let expected: Vec<(String, bool)> = items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| match item {
                BodyItem::Tool { observed, .. } => Some((tool_name(index), *observed)),
                _ => None,
            })
            .collect();
        let actual: Vec<(String, bool)> = turn
            .tool_calls()
            .records()
            .iter()
            .map(|r| (r.tool_name.clone(), r.status == ToolCallStatus::Complete))
            .collect();

        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn prop_text_is_concatenation_of_chunks_and_thoughts(items in arb_body()) {
        let (turn, _) = replay(bracketed(&items));
        let turn = turn.unwrap();
        prop_assert_eq!(turn.text(), expected_text(&items));
    }

    #[test]
    fn prop_streaming_flips_exactly_once_each_way(items in arb_body()) {
        let mut aggregator = Aggregator::new();
        let mut streaming = false;
        let mut rises = 0;
        let mut falls = 0;

        for event in bracketed(&items) {
            aggregator.apply(event);
            let now = aggregator.phase() == Phase::Streaming;
            if now && !streaming {
                rises += 1;
            }
            if !now && streaming {
                falls += 1;
            }
            streaming = now;
        }

        prop_assert_eq!(rises, 1);
        prop_assert_eq!(falls, 1);
        prop_assert!(!streaming);
    }

    #[test]
    fn prop_orphan_observation_leaves_tool_calls_unchanged(items in arb_closed_body()) {
        let mut events = vec![StreamEvent::Start { message_id: None }];
        events.extend(body_events(&items));
        let (before, _) = replay(events.clone());

        events.push(StreamEvent::Observation {
            content: "stray".to_string(),
            success: true,
            step: None,
        });
        let (after, effects) = replay(events);
        let before = before.unwrap();
        let after = after.unwrap();

        prop_assert_eq!(before.tool_calls().records(), after.tool_calls().records());
        prop_assert!(matches!(
            effects.last(),
            Some(Effect::Anomaly(Anomaly::OrphanObservation))
        ));
    }

    #[test]
    fn prop_error_turn_discards_text(items in arb_body(), message in "[a-z]{1,12}") {
        let mut events = vec![StreamEvent::Start { message_id: None }];
        events.extend(body_events(&items));
        events.push(StreamEvent::Error { message: Some(message.clone()) });

        let (turn, effects) = replay(events);
        let turn = turn.unwrap();

        prop_assert!(!turn.is_streaming());
        prop_assert_eq!(turn.text(), "");
        prop_assert_eq!(turn.outcome(), Some(TurnOutcome::Failed));
        prop_assert!(effects.contains(&Effect::SetError(SessionError::new(message))));
        let refreshed = effects.iter().any(|e| matches!(e, Effect::RefreshHistory { .. }));
        prop_assert!(!refreshed);
    }

    #[test]
    fn prop_malformed_frames_do_not_disturb_turn(items in arb_body(), at in 0usize..12) {
        let clean = bracketed(&items);
        let mut noisy = clean.clone();
        let index = 1 + at % (noisy.len() - 1);
        noisy.insert(index, StreamEvent::Malformed { reason: "bad".to_string() });

        let (clean_turn, _) = replay(clean);
        let (noisy_turn, _) = replay(noisy);
        prop_assert_eq!(clean_turn, noisy_turn);
    }

    #[test]
    fn prop_decode_never_panics(raw in ".{0,64}") {
        let _ = decode(&raw);
    }

    #[test]
    fn prop_valid_frames_decode(frame in arb_frame()) {
        let raw = serde_json::to_string(&frame).unwrap();
        prop_assert_eq!(decode(&raw).unwrap(), frame);
    }
}
