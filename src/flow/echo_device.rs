//! Echo device node: tags inbound messages with their Home Assistant linkage

use super::{FlowMessage, FlowNode, NodeContext, Payload};
use crate::config::DeviceLinkage;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

pub const HA_DEVICE_ID_FIELD: &str = "haDeviceId";
pub const HA_ENTITY_ID_FIELD: &str = "haEntityId";

/// Echo device node bound to one Home Assistant device/entity
#[derive(Debug, Clone)]
pub struct EchoDeviceNode {
    linkage: DeviceLinkage,
}

impl EchoDeviceNode {
    pub fn new(linkage: DeviceLinkage) -> Self {
        Self { linkage }
    }

    pub fn linkage(&self) -> &DeviceLinkage {
        &self.linkage
    }

    /// Identifier an inbound `deviceid` must equal; the configured
    /// identifier when set, else the node id
    pub fn target_identifier(&self) -> &str {
        self.linkage
            .own_device_identifier
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.linkage.id)
    }

    /// Enrich `msg` in place when it targets this node. Returns whether the
    /// message was enriched.
    pub fn process(&self, msg: &mut FlowMessage) -> bool {
        if msg.device_id() != Some(self.target_identifier()) {
            return false;
        }

        let mut payload = std::mem::take(&mut msg.payload).into_object();
        payload.insert(
            HA_DEVICE_ID_FIELD.to_string(),
            Value::String(self.linkage.device_id.clone().unwrap_or_default()),
        );
        payload.insert(
            HA_ENTITY_ID_FIELD.to_string(),
            Value::String(self.linkage.entity_id.clone().unwrap_or_default()),
        );
        msg.payload = Payload::Object(payload);
        true
    }
}

#[async_trait]
impl FlowNode for EchoDeviceNode {
    fn id(&self) -> &str {
        &self.linkage.id
    }

    fn kind(&self) -> &'static str {
        "echo-device"
    }

    fn on_input(&self, mut msg: FlowMessage, ctx: &NodeContext) {
        if self.process(&mut msg) {
            debug!(node_id = %self.linkage.id, "Enriched message with linkage");
        }

        if let Err(e) = ctx.send(msg) {
            ctx.error(e.to_string());
        }
        ctx.done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::InputOutcome;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn node(device: Option<&str>, entity: Option<&str>, own: Option<&str>) -> EchoDeviceNode {
        EchoDeviceNode::new(DeviceLinkage {
            id: "n1".into(),
            name: "Lamp".into(),
            server_config_id: Some("ha".into()),
            area_id: None,
            label_id: None,
            domain: None,
            device_id: device.map(str::to_string),
            entity_id: entity.map(str::to_string),
            own_device_identifier: own.map(str::to_string),
        })
    }

    #[test]
    fn test_scalar_payload_is_wrapped_and_tagged() {
        let node = node(Some("dev1"), Some("light.y"), None);
        let mut msg = FlowMessage::new("n1", json!("42"));

        assert!(node.process(&mut msg));
        assert_eq!(
            serde_json::to_value(&msg.payload).unwrap(),
            json!({"value": "42", "haDeviceId": "dev1", "haEntityId": "light.y"})
        );
    }

    #[test]
    fn test_object_payload_keeps_fields() {
        let node = node(Some("dev1"), None, None);
        let mut msg = FlowMessage::new("n1", json!({"on": true}));

        node.process(&mut msg);
        assert_eq!(
            serde_json::to_value(&msg.payload).unwrap(),
            json!({"on": true, "haDeviceId": "dev1", "haEntityId": ""})
        );
    }

    #[test]
    fn test_other_target_passes_unmodified() {
        let node = node(Some("dev1"), Some("light.y"), None);
        let original: FlowMessage =
            serde_json::from_value(json!({"deviceid": "n2", "payload": "42", "topic": "x"}))
                .unwrap();
        let mut msg = original.clone();

        assert!(!node.process(&mut msg));
        assert_eq!(msg, original);
    }

    #[test]
    fn test_own_identifier_overrides_node_id() {
        let node = node(Some("dev1"), None, Some("echo-lamp"));
        assert_eq!(node.target_identifier(), "echo-lamp");

        let mut by_node_id = FlowMessage::new("n1", json!(1));
        assert!(!node.process(&mut by_node_id));

        let mut by_own_id = FlowMessage::new("echo-lamp", json!(1));
        assert!(node.process(&mut by_own_id));
    }

    #[tokio::test]
    async fn test_input_always_forwards_and_completes() {
        let node = node(Some("dev1"), Some("light.y"), None);
        let (ctx, events) = NodeContext::channel("n1");
        node.on_input(FlowMessage::new("other", json!(5)), &ctx);
        drop(ctx);

        let outcome = InputOutcome::collect(events).await;
        assert!(outcome.done);
        assert_eq!(outcome.forwarded, vec![FlowMessage::new("other", json!(5))]);
    }

    #[test]
    fn test_closed_output_does_not_panic() {
        let node = node(None, None, None);
        let (ctx, mut events) = NodeContext::channel("n1");
        events.close();

        node.on_input(FlowMessage::new("n1", json!(1)), &ctx);
        assert!(ctx.send(FlowMessage::default()).is_err());
    }
}
