use serde::{Deserialize, Deserializer, Serialize};

/// Durable queue carrying order submissions from the HTTP API to the consumer.
pub const ORDERS_QUEUE: &str = "orders";

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Body of a message on the orders queue.
///
/// One message stands for one ticket; there is no quantity field.
///
/// A missing or `null` ticket id decodes as 0, which matches no ticket, so
/// such a message is dropped by the processor instead of being requeued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderMessage {
    #[serde(default, deserialize_with = "null_as_zero")]
    pub ticket_id: i32,
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<i32>::deserialize(deserializer)?.unwrap_or_default())
}

impl OrderMessage {
    pub fn new(ticket_id: i32) -> Self {
        Self { ticket_id }
    }

    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_payload(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_minimal_body() {
        let message = OrderMessage::from_payload(br#"{"ticket_id": 5}"#).unwrap();
        assert_eq!(message, OrderMessage::new(5));
    }

    #[test]
    fn ignores_unknown_fields() {
        let body = br#"{"order_id": 0, "ticket_id": 7, "deleted_at": null}"#;
        let message = OrderMessage::from_payload(body).unwrap();
        assert_eq!(message.ticket_id, 7);
    }

    #[test]
    fn absent_or_null_ticket_id_decodes_as_zero() {
        let bodies: [&[u8]; 4] = [
            b"{}",
            br#"{"ticket_id": null}"#,
            br#"{"TicketID": 5}"#,
            br#"{"quantity": 1}"#,
        ];
        for body in bodies {
            assert_eq!(OrderMessage::from_payload(body).unwrap(), OrderMessage::new(0));
        }
    }

    #[test]
    fn rejects_bodies_that_are_not_an_order_object() {
        assert!(OrderMessage::from_payload(b"not json").is_err());
        assert!(OrderMessage::from_payload(b"").is_err());
        assert!(OrderMessage::from_payload(b"[5]").is_err());
        assert!(OrderMessage::from_payload(br#"{"ticket_id": "five"}"#).is_err());
    }

    #[test]
    fn payload_is_a_json_object() {
        let payload = OrderMessage::new(3).to_payload().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value, serde_json::json!({ "ticket_id": 3 }));
    }
}
