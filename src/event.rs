// Grounded on fuurin's Event (include/fuurin/event.h): what a session
// publishes back to its owning runner in response to operations and
// protocol activity.

use crate::error::{Error, Result};
use crate::id::Id;
use crate::part::{Packer, Part, Unpacker};
use crate::topic::Topic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    Discard,
    Timeout,
    Success,
}

impl Notification {
    fn as_u8(self) -> u8 {
        match self {
            Notification::Discard => 0,
            Notification::Timeout => 1,
            Notification::Success => 2,
        }
    }

    fn from_u8(v: u8) -> Result<Notification> {
        match v {
            0 => Ok(Notification::Discard),
            1 => Ok(Notification::Timeout),
            2 => Ok(Notification::Success),
            other => Err(Error::Part(format!("unknown event notification {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Invalid,
    Started,
    Stopped,
    Offline,
    Online,
    Delivery,
    SyncRequest,
    SyncBegin,
    SyncElement,
    SyncSuccess,
    SyncError,
    SyncDownloadOn,
    SyncDownloadOff,
}

impl Type {
    fn as_u8(self) -> u8 {
        match self {
            Type::Invalid => 0,
            Type::Started => 1,
            Type::Stopped => 2,
            Type::Offline => 3,
            Type::Online => 4,
            Type::Delivery => 5,
            Type::SyncRequest => 6,
            Type::SyncBegin => 7,
            Type::SyncElement => 8,
            Type::SyncSuccess => 9,
            Type::SyncError => 10,
            Type::SyncDownloadOn => 11,
            Type::SyncDownloadOff => 12,
        }
    }

    fn from_u8(v: u8) -> Result<Type> {
        Ok(match v {
            0 => Type::Invalid,
            1 => Type::Started,
            2 => Type::Stopped,
            3 => Type::Offline,
            4 => Type::Online,
            5 => Type::Delivery,
            6 => Type::SyncRequest,
            7 => Type::SyncBegin,
            8 => Type::SyncElement,
            9 => Type::SyncSuccess,
            10 => Type::SyncError,
            11 => Type::SyncDownloadOn,
            12 => Type::SyncDownloadOff,
            other => return Err(Error::Part(format!("unknown event type {other}"))),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    None,
    BrokerId(Id),
    Topic(Topic),
    Raw(Part),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    kind: Type,
    notification: Notification,
    payload: Payload,
}

impl Event {
    pub fn new(kind: Type, notification: Notification, payload: Payload) -> Event {
        Event { kind, notification, payload }
    }

    pub fn invalid(notification: Notification) -> Event {
        Event::new(Type::Invalid, notification, Payload::None)
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

    pub fn topic(&self) -> Option<&Topic> {
        match &self.payload {
            Payload::Topic(t) => Some(t),
            _ => None,
        }
    }

    pub fn to_part(&self) -> Part {
        let payload_part = match &self.payload {
            Payload::None => Part::empty(),
            Payload::BrokerId(id) => id.to_part(),
            Payload::Topic(t) => t.to_part(),
            Payload::Raw(p) => p.clone(),
        };
        Packer::new()
            .put_u8(self.kind.as_u8())
            .put_u8(self.notification.as_u8())
            .put_part(&payload_part)
            .finish()
    }

    pub fn from_part(part: &Part) -> Result<Event> {
        let mut u = Unpacker::new(part);
        let kind = Type::from_u8(u.get_u8()?)?;
        let notification = Notification::from_u8(u.get_u8()?)?;
        let payload_part = u.get_part()?;
        let payload = match kind {
            Type::SyncBegin | Type::SyncSuccess | Type::SyncError if !payload_part.is_empty() => {
                Payload::BrokerId(Id::from_part(&payload_part)?)
            }
            Type::Delivery | Type::SyncElement if !payload_part.is_empty() => {
                Payload::Topic(Topic::from_part(&payload_part)?)
            }
            _ if payload_part.is_empty() => Payload::None,
            _ => Payload::Raw(payload_part),
        };
        Ok(Event { kind, notification, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::{Kind as TopicKind, Name};

    #[test]
    fn invalid_event_round_trips() {
        let e = Event::invalid(Notification::Timeout);
        assert_eq!(e, Event::from_part(&e.to_part()).unwrap());
    }

    #[test]
    fn delivery_event_round_trips_its_topic() {
        let t = Topic::new(Id::random(), Name::new("x").unwrap(), Part::from_str("y"), TopicKind::State);
        let e = Event::new(Type::Delivery, Notification::Success, Payload::Topic(t));
        assert_eq!(e, Event::from_part(&e.to_part()).unwrap());
    }
}
