//! Domain events handed to the notification dispatcher
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    UserRegistered { user_id: i64, email: String, token: String },
    PasswordResetRequested { user_id: i64, email: String, token: String },
    OrderPlaced { order_id: i64, user_id: i64, email: String },
}

impl DomainEvent {
    /// Message subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::UserRegistered { .. } => "orders.user_registered",
            Self::PasswordResetRequested { .. } => "orders.password_reset_requested",
            Self::OrderPlaced { .. } => "orders.order_placed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_payload_is_tagged() {
        let e = DomainEvent::OrderPlaced { order_id: 3, user_id: 1, email: "a@b.io".into() };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["event"], "order_placed");
        assert_eq!(json["order_id"], 3);
        assert_eq!(e.subject(), "orders.order_placed");
    }
}
