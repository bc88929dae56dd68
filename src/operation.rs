// Grounded on fuurin's Operation (include/fuurin/operation.h): commands an
// owner posts into its session. Structurally identical to Event, but with
// no Timeout notification (an operation is always either applied or
// discarded as stale) and a distinct set of types.

use crate::error::{Error, Result};
use crate::part::{Packer, Part, Unpacker};
use crate::topic::Topic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    Discard,
    Success,
}

impl Notification {
    fn as_u8(self) -> u8 {
        match self {
            Notification::Discard => 0,
            Notification::Success => 1,
        }
    }

    fn from_u8(v: u8) -> Result<Notification> {
        match v {
            0 => Ok(Notification::Discard),
            1 => Ok(Notification::Success),
            other => Err(Error::Part(format!("unknown operation notification {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Invalid,
    Start,
    Stop,
    Dispatch,
    Sync,
}

impl Type {
    fn as_u8(self) -> u8 {
        match self {
            Type::Invalid => 0,
            Type::Start => 1,
            Type::Stop => 2,
            Type::Dispatch => 3,
            Type::Sync => 4,
        }
    }

    fn from_u8(v: u8) -> Result<Type> {
        Ok(match v {
            0 => Type::Invalid,
            1 => Type::Start,
            2 => Type::Stop,
            3 => Type::Dispatch,
            4 => Type::Sync,
            other => return Err(Error::Part(format!("unknown operation type {other}"))),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    None,
    Config(Part),
    Topic(Topic),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    kind: Type,
    notification: Notification,
    payload: Payload,
}

impl Operation {
    pub fn new(kind: Type, payload: Payload) -> Operation {
        Operation { kind, notification: Notification::Success, payload }
    }

    pub fn discard(kind: Type) -> Operation {
        Operation { kind, notification: Notification::Discard, payload: Payload::None }
    }

    pub fn kind(&self) -> Type {
        self.kind
    }

    pub fn notification(&self) -> Notification {
        self.notification
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn to_part(&self) -> Part {
        let payload_part = match &self.payload {
            Payload::None => Part::empty(),
            Payload::Config(p) => p.clone(),
            Payload::Topic(t) => t.to_part(),
        };
        Packer::new()
            .put_u8(self.kind.as_u8())
            .put_u8(self.notification.as_u8())
            .put_part(&payload_part)
            .finish()
    }

    pub fn from_part(part: &Part) -> Result<Operation> {
        let mut u = Unpacker::new(part);
        let kind = Type::from_u8(u.get_u8()?)?;
        let notification = Notification::from_u8(u.get_u8()?)?;
        let payload_part = u.get_part()?;
        let payload = match kind {
            Type::Start if !payload_part.is_empty() => Payload::Config(payload_part),
            Type::Dispatch if !payload_part.is_empty() => {
                Payload::Topic(Topic::from_part(&payload_part)?)
            }
            _ => Payload::None,
        };
        Ok(Operation { kind, notification, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_operation_round_trips_with_no_payload() {
        let op = Operation::new(Type::Stop, Payload::None);
        assert_eq!(op, Operation::from_part(&op.to_part()).unwrap());
    }

    #[test]
    fn discard_operation_carries_no_payload() {
        let op = Operation::discard(Type::Start);
        assert_eq!(Notification::Discard, op.notification());
    }
}
