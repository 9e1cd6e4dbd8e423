use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LinkError;

/// Messaging pattern governing backpressure and acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Discipline {
    /// Every frame waits for an acknowledgment; one frame in flight per
    /// producer.
    #[default]
    RequestReply,
    /// Fire-and-forget fan-in; frames are dropped when buffers fill.
    PublishSubscribe,
}

impl Discipline {
    /// Returns `true` if the consumer answers every frame.
    pub fn acknowledges(self) -> bool {
        matches!(self, Discipline::RequestReply)
    }
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discipline::RequestReply => write!(f, "request-reply"),
            Discipline::PublishSubscribe => write!(f, "publish-subscribe"),
        }
    }
}

impl FromStr for Discipline {
    type Err = LinkError;

    /// Accepts the long names, short forms and the numeric `1`/`2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "req-rep" | "reqrep" | "request-reply" => Ok(Discipline::RequestReply),
            "2" | "pub-sub" | "pubsub" | "publish-subscribe" => Ok(Discipline::PublishSubscribe),
            _ => Err(LinkError::UnknownDiscipline(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_spellings() {
        for s in ["1", "req-rep", "REQREP", "request-reply"] {
            assert_eq!(s.parse::<Discipline>().unwrap(), Discipline::RequestReply);
        }
        for s in ["2", "pub-sub", "pubsub", " publish-subscribe "] {
            assert_eq!(
                s.parse::<Discipline>().unwrap(),
                Discipline::PublishSubscribe
            );
        }
        assert!("3".parse::<Discipline>().is_err());
    }

    #[test]
    fn display_parses_back() {
        for d in [Discipline::RequestReply, Discipline::PublishSubscribe] {
            assert_eq!(d.to_string().parse::<Discipline>().unwrap(), d);
        }
    }
}
