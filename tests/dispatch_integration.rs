//! Integration tests for pipeline dispatch
//!
//! These tests drive the dispatcher directly with real and mocked plugins:
//! - Ordered, independent pipelines from one filtered packet
//! - Halting, unknown plugins and failing steps
//! - Forwarding to brokers and radios

mod common;

use common::builders::{filtered_text_packet, step, text_packet, TableBuilder};
use common::mock_helpers::{
    recording, FailingPlugin, GatedPlugin, MockBroker, RejectAllFilter, TransformPlugin,
};
use common::test_timeout;
use meshbridge::config::DeviceConfig;
use meshbridge::pipeline::{Dispatcher, FilterOutcome, Packet, PluginRegistry, StepOutcome};
use meshbridge::registry::{BrokerRegistry, DeviceRegistry};
use meshbridge::transport::memory::{MemoryDeviceConnector, SentMessage};
use meshbridge::transport::{Destination, DeviceConnector, QoS};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::thread;

fn dispatcher(plugins: PluginRegistry) -> Dispatcher {
    Dispatcher::new(Arc::new(plugins), DeviceRegistry::new(), BrokerRegistry::new())
}

#[test]
fn test_filtered_packet_forwarded_to_broker_once() {
    let mut broker = MockBroker::new();
    broker.expect_name().return_const("b1".to_string());
    broker
        .expect_publish()
        .withf(|topic, payload, qos| {
            let body: serde_json::Value = serde_json::from_slice(payload).unwrap();
            topic == "mesh/out" && body["transformed"] == json!(true) && *qos == QoS::AtMostOnce
        })
        .times(1)
        .returning(|_, _, _| Ok(1));

    let brokers = BrokerRegistry::new();
    brokers.install("b1", Arc::new(broker));

    let mut plugins = PluginRegistry::with_builtins();
    plugins.register_custom(|| Box::new(TransformPlugin("filterA")));
    let dispatcher = Dispatcher::new(Arc::new(plugins), DeviceRegistry::new(), brokers);

    let table = TableBuilder::new()
        .steps(
            "p1",
            vec![
                step("filterA", json!(null)),
                step("mqtt_plugin", json!({"name": "b1", "topic": "mesh/out"})),
            ],
        )
        .build();

    let report = dispatcher.dispatch("radio", Packet::from(text_packet(1, "hi")), &table);
    assert_eq!(
        report.pipeline("p1").unwrap().steps,
        vec![StepOutcome::Passed, StepOutcome::Passed]
    );
}

#[test]
fn test_dropping_pipeline_does_not_affect_forwarding_pipeline() {
    let connector = MemoryDeviceConnector::new();
    let (tx, _rx) = crossbeam_channel::unbounded();
    let config = DeviceConfig {
        name: "d1".into(),
        ..Default::default()
    };
    let devices = DeviceRegistry::new();
    devices.install("d1", connector.connect(&config, tx).unwrap());

    let mut plugins = PluginRegistry::with_builtins();
    let (after_drop, after_drop_seen) = recording("after_drop");
    plugins.register_custom(after_drop);
    let dispatcher = Dispatcher::new(Arc::new(plugins), devices, BrokerRegistry::new());

    let table = TableBuilder::new()
        .pipeline("p1", &["drop", "after_drop"])
        .steps(
            "p2",
            vec![
                step("passthrough", json!(null)),
                step("radio_message_plugin", json!({"device": "d1"})),
            ],
        )
        .build();

    let report = dispatcher.dispatch("mqtt", Packet::from(text_packet(2, "relay me")), &table);

    assert_eq!(after_drop_seen.count(), 0);
    assert_eq!(
        report.pipeline("p1").unwrap().steps,
        vec![StepOutcome::Dropped, StepOutcome::NotRun]
    );
    let sent = connector.latest("d1").unwrap().sent();
    assert_eq!(
        sent,
        vec![SentMessage::Text {
            text: "relay me".into(),
            destination: Destination::Broadcast,
            channel_index: 0,
        }]
    );
}

#[test]
fn test_unknown_plugin_leaves_packet_unmodified() {
    let mut plugins = PluginRegistry::with_builtins();
    let (rec, seen) = recording("rec");
    plugins.register_custom(rec);
    let dispatcher = dispatcher(plugins);

    let table = TableBuilder::new()
        .pipeline("p1", &["nonexistent", "rec"])
        .build();
    let report = dispatcher.dispatch("radio", Packet::from(text_packet(3, "x")), &table);

    assert_eq!(
        report.pipeline("p1").unwrap().steps,
        vec![StepOutcome::UnknownPlugin, StepOutcome::Passed]
    );
    assert_eq!(seen.packets(), vec![Packet::from(filtered_text_packet(3, "x"))]);
}

#[test]
fn test_filter_absence_runs_no_step() {
    let mut plugins = PluginRegistry::with_builtins();
    plugins.register_custom(|| Box::new(RejectAllFilter));
    let (rec, seen) = recording("rec");
    plugins.register_custom(rec);
    let dispatcher = dispatcher(plugins);

    let table = TableBuilder::new()
        .pipeline("p1", &["rec"])
        .pipeline("p2", &["rec", "rec"])
        .build();
    let report = dispatcher.dispatch("radio", Packet::from(text_packet(4, "x")), &table);

    assert_eq!(report.filter, FilterOutcome::Dropped);
    assert!(report.pipelines.is_empty());
    assert_eq!(seen.count(), 0);
    assert!(seen.options().is_empty());
}

#[test]
fn test_failing_step_is_contained() {
    let mut plugins = PluginRegistry::with_builtins();
    plugins.register_custom(|| Box::new(FailingPlugin("flaky")));
    let (rec, seen) = recording("rec");
    plugins.register_custom(rec);
    let dispatcher = dispatcher(plugins);

    let table = TableBuilder::new().pipeline("p1", &["flaky", "rec"]).build();
    let report = dispatcher.dispatch("radio", Packet::from(text_packet(5, "x")), &table);

    let steps = &report.pipeline("p1").unwrap().steps;
    assert!(matches!(steps[0], StepOutcome::Failed(ref m) if m.contains("induced failure")));
    assert_eq!(steps[1], StepOutcome::Passed);
    assert_eq!(seen.packets(), vec![Packet::from(filtered_text_packet(5, "x"))]);
}

#[test]
fn test_step_options_reach_plugin() {
    let mut plugins = PluginRegistry::with_builtins();
    let (rec, seen) = recording("rec");
    plugins.register_custom(rec);
    let dispatcher = dispatcher(plugins);

    let table = TableBuilder::new()
        .steps("p1", vec![step("rec", json!({"k": 1}))])
        .steps("p2", vec![step("rec", json!({"k": 2}))])
        .build();
    dispatcher.dispatch("radio", Packet::from(text_packet(6, "x")), &table);

    assert_eq!(seen.options(), vec![json!({"k": 1}), json!({"k": 2})]);
}

#[test]
fn test_duplicate_packets_dispatched_once() {
    let mut plugins = PluginRegistry::with_builtins();
    let (rec, seen) = recording("rec");
    plugins.register_custom(rec);
    let dispatcher = dispatcher(plugins);
    let table = TableBuilder::new().pipeline("p1", &["rec"]).build();

    for _ in 0..3 {
        dispatcher.dispatch("radio", Packet::from(text_packet(77, "x")), &table);
    }
    assert_eq!(seen.count(), 1);
}

#[test]
fn test_message_filter_then_forward() {
    let mut broker = MockBroker::new();
    broker.expect_name().return_const("b1".to_string());
    broker
        .expect_publish()
        .withf(|_, payload, _| std::str::from_utf8(payload).unwrap().contains("keep"))
        .times(1)
        .returning(|_, _, _| Ok(7));
    let brokers = BrokerRegistry::new();
    brokers.install("b1", Arc::new(broker));
    let dispatcher = Dispatcher::new(
        Arc::new(PluginRegistry::with_builtins()),
        DeviceRegistry::new(),
        brokers,
    );

    let table = TableBuilder::new()
        .steps(
            "texts",
            vec![
                step("message_filter", json!({"from": {"disallow": ["!spammer"]}})),
                step("mqtt_plugin", json!({"name": "b1", "topic": "t"})),
            ],
        )
        .build();

    let mut spam = text_packet(10, "spam");
    spam["fromId"] = json!("!spammer");
    dispatcher.dispatch("radio", Packet::from(spam), &table);
    dispatcher.dispatch("radio", Packet::from(text_packet(11, "keep")), &table);
}

#[test]
fn test_blocked_plugin_does_not_stall_other_sources() {
    let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
    let (release_tx, release_rx) = crossbeam_channel::unbounded();
    let mut plugins = PluginRegistry::with_builtins();
    plugins.register_custom(move || {
        Box::new(GatedPlugin {
            id: 1,
            entered: entered_tx.clone(),
            release: release_rx.clone(),
        })
    });
    let dispatcher = dispatcher(plugins);
    let table = TableBuilder::new().pipeline("p1", &["gated", "passthrough"]).build();

    let blocked = {
        let dispatcher = dispatcher.clone();
        let table = table.clone();
        thread::spawn(move || {
            dispatcher.dispatch("radio1", Packet::from(text_packet(1, "slow")), &table)
        })
    };
    assert_eq!(entered_rx.recv_timeout(test_timeout()), Ok(1));

    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    let other = {
        let dispatcher = dispatcher.clone();
        let table = table.clone();
        thread::spawn(move || {
            let report =
                dispatcher.dispatch("broker1", Packet::from(text_packet(2, "fast")), &table);
            let _ = done_tx.send(report);
        })
    };
    let report = done_rx
        .recv_timeout(test_timeout())
        .expect("dispatch from another source waited on the blocked plugin");
    assert_eq!(
        report.pipeline("p1").unwrap().steps,
        vec![StepOutcome::Passed, StepOutcome::Passed]
    );

    release_tx.send(()).unwrap();
    let blocked = blocked.join().unwrap();
    assert!(blocked.pipeline("p1").unwrap().completed());
    other.join().unwrap();
}

#[test]
fn test_echoed_packet_is_a_duplicate_across_sources() {
    let mut plugins = PluginRegistry::with_builtins();
    let (rec, seen) = recording("rec");
    plugins.register_custom(rec);
    let dispatcher = dispatcher(plugins);
    let table = TableBuilder::new().pipeline("p1", &["rec"]).build();

    let first = dispatcher.dispatch("radio1", Packet::from(text_packet(12, "loop")), &table);
    let echo = dispatcher.dispatch("broker1", Packet::from(text_packet(12, "loop")), &table);

    assert_eq!(first.filter, FilterOutcome::Passed);
    assert_eq!(echo.filter, FilterOutcome::Dropped);
    assert_eq!(seen.count(), 1);
}

proptest! {
    #[test]
    fn prop_each_pipeline_runs_once_from_filtered_packet(n in 0usize..8, id in 1u64..10_000) {
        let mut plugins = PluginRegistry::with_builtins();
        let mut recorders = Vec::new();
        let mut table = TableBuilder::new();
        for i in 0..n {
            let name = format!("rec{}", i);
            let (rec, seen) = recording(&name);
            plugins.register_custom(rec);
            recorders.push(seen);
            table = table.pipeline(&format!("p{}", i), &[name.as_str()]);
        }
        let dispatcher = dispatcher(plugins);

        let report = dispatcher.dispatch("radio", Packet::from(text_packet(id, "prop")), &table.build());

        prop_assert_eq!(report.pipelines.len(), n);
        let expected = Packet::from(filtered_text_packet(id, "prop"));
        for seen in &recorders {
            prop_assert_eq!(seen.packets(), vec![expected.clone()]);
        }
    }
}
