// Grounded on fuurin's WorkerConfig/BrokerConfig (include/fuurin/workerconfig.h,
// include/fuurin/brokerconfig.h): the run parameters applied by a Start
// operation, serialisable for host applications and wire-codable for the
// bespoke snapshot-request payload.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::id::Id;
use crate::part::{Packer, Part, Unpacker};
use crate::topic::Name;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    pub uuid: Id,
    pub endpoints_delivery: Vec<String>,
    pub endpoints_dispatch: Vec<String>,
    pub endpoints_snapshot: Vec<String>,
}

impl BrokerConfig {
    pub fn new(uuid: Id) -> BrokerConfig {
        BrokerConfig {
            uuid,
            endpoints_delivery: Vec::new(),
            endpoints_dispatch: Vec::new(),
            endpoints_snapshot: Vec::new(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> BrokerConfig {
        BrokerConfig::new(Id::null())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub uuid: Id,
    pub seq_num: u64,
    pub topics_all: bool,
    pub topics_names: Vec<Name>,
    pub endpoints_delivery: Vec<String>,
    pub endpoints_dispatch: Vec<String>,
    pub endpoints_snapshot: Vec<String>,
}

impl WorkerConfig {
    pub fn new(uuid: Id) -> WorkerConfig {
        WorkerConfig {
            uuid,
            seq_num: 0,
            topics_all: true,
            topics_names: Vec::new(),
            endpoints_delivery: Vec::new(),
            endpoints_dispatch: Vec::new(),
            endpoints_snapshot: Vec::new(),
        }
    }

    pub fn to_part(&self) -> Part {
        let mut p = Packer::new()
            .put_part(&self.uuid.to_part())
            .put_u64(self.seq_num)
            .put_bool(self.topics_all)
            .put_u32(self.topics_names.len() as u32);
        for name in &self.topics_names {
            p = p.put_str(name.as_str());
        }
        p.finish()
    }

    pub fn from_part(part: &Part) -> Result<WorkerConfig> {
        let mut u = Unpacker::new(part);
        let uuid = Id::from_part(&u.get_part()?)?;
        let seq_num = u.get_u64()?;
        let topics_all = u.get_bool()?;
        let count = u.get_u32()?;
        let mut topics_names = Vec::with_capacity(count as usize);
        for _ in 0..count {
            topics_names.push(Name::new(u.get_str()?)?);
        }
        Ok(WorkerConfig {
            uuid,
            seq_num,
            topics_all,
            topics_names,
            endpoints_delivery: Vec::new(),
            endpoints_dispatch: Vec::new(),
            endpoints_snapshot: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_config_part_round_trips_subscription_fields() {
        let mut cfg = WorkerConfig::new(Id::random());
        cfg.seq_num = 9;
        cfg.topics_all = false;
        cfg.topics_names = vec![Name::new("price").unwrap(), Name::new("book").unwrap()];

        let part = cfg.to_part();
        let back = WorkerConfig::from_part(&part).unwrap();
        assert_eq!(cfg.uuid, back.uuid);
        assert_eq!(cfg.seq_num, back.seq_num);
        assert_eq!(cfg.topics_all, back.topics_all);
        assert_eq!(cfg.topics_names, back.topics_names);
    }
}
