// Grounded on fuurin's Topic (include/fuurin/topic.h): a keyed, sequenced,
// typed value produced by a worker and, once accepted by a broker, stamped
// with the broker's identity and redistributed.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::Id;
use crate::part::{Packer, Part, Unpacker};

const NAME_CAPACITY: usize = 16;

/// Whether a topic is retained by a broker's store (`State`) or forwarded
/// only to currently-connected subscribers (`Event`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    State,
    Event,
}

impl Kind {
    fn as_u8(self) -> u8 {
        match self {
            Kind::State => 0,
            Kind::Event => 1,
        }
    }

    fn from_u8(v: u8) -> Result<Kind> {
        match v {
            0 => Ok(Kind::State),
            1 => Ok(Kind::Event),
            other => Err(Error::Part(format!("unknown topic kind {other}"))),
        }
    }
}

/// A bounded-length topic name (at most 16 bytes), used both as a storage
/// key in a broker and as the radio/dish group for filtered delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Name(String);

impl Name {
    pub fn new(s: impl Into<String>) -> Result<Name> {
        let s = s.into();
        if s.len() > NAME_CAPACITY {
            return Err(Error::Part(format!(
                "topic name '{s}' exceeds {NAME_CAPACITY} bytes"
            )));
        }
        Ok(Name(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    broker: Id,
    worker: Id,
    seq_num: u64,
    name: Name,
    data: Part,
    kind: Kind,
}

impl Topic {
    pub fn new(worker: Id, name: Name, data: Part, kind: Kind) -> Topic {
        Topic {
            broker: Id::null(),
            worker,
            seq_num: 0,
            name,
            data,
            kind,
        }
    }

    pub fn broker(&self) -> &Id {
        &self.broker
    }

    pub fn worker(&self) -> &Id {
        &self.worker
    }

    pub fn seq_num(&self) -> u64 {
        self.seq_num
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn data(&self) -> &Part {
        &self.data
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn with_broker(mut self, broker: Id) -> Topic {
        self.broker = broker;
        self
    }

    pub fn with_seq_num(mut self, seq_num: u64) -> Topic {
        self.seq_num = seq_num;
        self
    }

    pub fn to_part(&self) -> Part {
        Packer::new()
            .put_part(&self.broker.to_part())
            .put_part(&self.worker.to_part())
            .put_u64(self.seq_num)
            .put_str(&self.name.0)
            .put_u8(self.kind.as_u8())
            .put_part(&self.data)
            .finish()
    }

    pub fn from_part(part: &Part) -> Result<Topic> {
        let mut u = Unpacker::new(part);
        let broker = Id::from_part(&u.get_part()?)?;
        let worker = Id::from_part(&u.get_part()?)?;
        let seq_num = u.get_u64()?;
        let name = Name::new(u.get_str()?)?;
        let kind = Kind::from_u8(u.get_u8()?)?;
        let data = u.get_part()?;
        Ok(Topic { broker, worker, seq_num, name, data, kind })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_part_round_trips() {
        let t = Topic::new(Id::random(), Name::new("price").unwrap(), Part::from_str("42"), Kind::State)
            .with_broker(Id::random())
            .with_seq_num(7);
        let part = t.to_part();
        assert_eq!(t, Topic::from_part(&part).unwrap());
    }

    #[test]
    fn name_rejects_overlong_strings() {
        assert!(Name::new("a".repeat(17)).is_err());
        assert!(Name::new("a".repeat(16)).is_ok());
    }
}
