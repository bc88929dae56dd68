// Grounded on fuurin's sessionbroker.cpp/sessionworker.cpp: the fixed
// group tags and snapshot verbs shared by both sides of the protocol.

/// Keepalive group, used in both directions (worker->broker and
/// broker->worker sockets are distinct, so the tag can be reused).
pub const GROUP_HUGZ: &str = "HUGZ";
/// Update/state-change group, used in both directions.
pub const GROUP_UPDT: &str = "UPDT";

/// Snapshot request verb (worker -> broker).
pub const VERB_SYNC: &str = "SYNC";
/// Snapshot begin marker (broker -> worker).
pub const VERB_BEGN: &str = "BEGN";
/// Snapshot element (broker -> worker), one per retained topic.
pub const VERB_ELEM: &str = "ELEM";
/// Snapshot complete marker (broker -> worker).
pub const VERB_SONC: &str = "SONC";

use crate::error::{Error, Result};
use crate::part::{Packer, Part, Unpacker};

/// One frame of the snapshot protocol: a verb, the request's syncseq (so
/// replies for an old/failed-over request can be told apart from current
/// ones), and a verb-specific payload.
pub struct SnapshotFrame {
    pub verb: String,
    pub syncseq: u8,
    pub payload: Part,
}

impl SnapshotFrame {
    pub fn new(verb: &str, syncseq: u8, payload: Part) -> SnapshotFrame {
        SnapshotFrame { verb: verb.to_string(), syncseq, payload }
    }

    pub fn to_part(&self) -> Part {
        Packer::new()
            .put_str(&self.verb)
            .put_u8(self.syncseq)
            .put_part(&self.payload)
            .finish()
    }

    pub fn from_part(part: &Part) -> Result<SnapshotFrame> {
        let mut u = Unpacker::new(part);
        let verb = u.get_str()?;
        let syncseq = u.get_u8()?;
        let payload = u.get_part()?;
        Ok(SnapshotFrame { verb, syncseq, payload })
    }
}

pub fn expect_verb(frame: &SnapshotFrame, expected: &str) -> Result<()> {
    if frame.verb != expected {
        return Err(Error::Protocol(format!(
            "expected verb '{expected}', got '{}'",
            frame.verb
        )));
    }
    Ok(())
}
