//! Last-writer-wins direction choice for bidirectional sync.
//!
//! Timestamps are compared at whole-second granularity. Concurrent edits on
//! both sides are not merged: whichever side changed last overwrites the
//! other.

use super::legacy::RemoteInfo;
use crate::models::{Container, Record};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upload,
    Download,
    InSync,
}

/// Newest modification time across records, containers and settings.
pub fn local_latest(
    records: &[Record],
    containers: &[Container],
    settings_updated_at: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    records
        .iter()
        .filter_map(|r| r.updated_at)
        .chain(containers.iter().filter_map(|c| c.updated_at))
        .chain(settings_updated_at)
        .max()
}

/// Missing timestamps on either side count as the Unix epoch.
pub fn decide(local: Option<DateTime<Utc>>, remote: RemoteInfo) -> Direction {
    let RemoteInfo::Present(remote) = remote else {
        return Direction::Upload;
    };

    let local = local.map_or(0, |t| t.timestamp());
    let remote = remote.map_or(0, |t| t.timestamp());
    match local.cmp(&remote) {
        std::cmp::Ordering::Greater => Direction::Upload,
        std::cmp::Ordering::Less => Direction::Download,
        std::cmp::Ordering::Equal => Direction::InSync,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::record;
    use serde_json::Map;

    fn at(s: &str) -> Option<DateTime<Utc>> {
        Some(s.parse().unwrap())
    }

    #[test]
    fn test_local_latest_spans_all_sources() {
        let records = vec![
            record("a", "2024-01-01T00:00:00Z", &[]),
            record("b", "2024-03-01T00:00:00Z", &[]),
        ];
        let containers = vec![Container {
            id: "f".into(),
            updated_at: at("2024-02-01T00:00:00Z"),
            extra: Map::new(),
        }];

        assert_eq!(local_latest(&records, &containers, None), at("2024-03-01T00:00:00Z"));
        assert_eq!(
            local_latest(&records, &containers, at("2024-04-01T00:00:00Z")),
            at("2024-04-01T00:00:00Z")
        );
        assert_eq!(local_latest(&[], &[], None), None);
    }

    #[test]
    fn test_decide() {
        let t = at("2024-05-05T10:00:00Z");
        let later = at("2024-05-05T10:00:01Z");

        assert_eq!(decide(t, RemoteInfo::Missing), Direction::Upload);
        assert_eq!(decide(t, RemoteInfo::Present(later)), Direction::Download);
        assert_eq!(decide(later, RemoteInfo::Present(t)), Direction::Upload);
        assert_eq!(decide(t, RemoteInfo::Present(t)), Direction::InSync);
    }

    #[test]
    fn test_decide_second_granularity() {
        let local = at("2024-05-05T10:00:00.900Z");
        let remote = at("2024-05-05T10:00:00.100Z");
        assert_eq!(decide(local, RemoteInfo::Present(remote)), Direction::InSync);
    }

    #[test]
    fn test_decide_missing_timestamps_are_epoch() {
        assert_eq!(decide(None, RemoteInfo::Present(None)), Direction::InSync);
        assert_eq!(decide(at("2024-01-01T00:00:00Z"), RemoteInfo::Present(None)), Direction::Upload);
        assert_eq!(decide(None, RemoteInfo::Present(at("2024-01-01T00:00:00Z"))), Direction::Download);
    }
}
