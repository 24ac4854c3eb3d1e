//! Session assignment by inactivity gap.
//!
//! Events are grouped by session identity (the client id, or a per-event
//! anonymous key), ordered by `(event_ts, seq)` within each group, and split
//! wherever the gap to the previous event exceeds the timeout. Session ids
//! are `<identity>_<index>` with the index counted from 0 per identity.

use chrono::{DateTime, Duration, Utc};
use clickpath_core::types::{EnrichedEvent, SessionEvent};
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

/// Prefix of the synthetic identity given to events without a client id.
pub const ANON_IDENTITY_PREFIX: &str = "anon_event_";

/// Marks client ids that would otherwise read as an anonymous key.
pub const CLIENT_ESCAPE: char = '~';

/// Key used to chain events into sessions. Anonymous events never share an
/// identity, so each forms a one-event session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Identity {
    Client(String),
    Anonymous(usize),
}

impl Identity {
    pub fn of(event: &EnrichedEvent) -> Self {
        match &event.client_id {
            Some(client_id) => Identity::Client(client_id.clone()),
            None => Identity::Anonymous(event.seq),
        }
    }
}

/// Client ids starting with the anonymous prefix or the escape character are
/// written with a leading `~`, so no client key can equal an anonymous one.
impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Client(id)
                if id.starts_with(ANON_IDENTITY_PREFIX) || id.starts_with(CLIENT_ESCAPE) =>
            {
                write!(f, "{CLIENT_ESCAPE}{id}")
            }
            Identity::Client(id) => f.write_str(id),
            Identity::Anonymous(seq) => write!(f, "{ANON_IDENTITY_PREFIX}{seq}"),
        }
    }
}

/// Tag every event with exactly one session id.
///
/// Output is ordered by identity, then `(event_ts, seq)`; identical input
/// always yields identical ids.
pub fn assign_sessions(events: &[EnrichedEvent], timeout: Duration) -> Vec<SessionEvent> {
    let mut groups: BTreeMap<Identity, Vec<&EnrichedEvent>> = BTreeMap::new();
    for event in events {
        groups.entry(Identity::of(event)).or_default().push(event);
    }

    let identities = groups.len();
    let mut sessions = 0usize;
    let mut tagged = Vec::with_capacity(events.len());

    for (identity, mut group) in groups {
        group.sort_by_key(|e| (e.event_ts, e.seq));
        let key = identity.to_string();

        let mut index = 0usize;
        let mut prev_ts: Option<DateTime<Utc>> = None;
        for event in group {
            let new_session = match prev_ts {
                None => true,
                Some(prev) => event.event_ts - prev > timeout,
            };
            if new_session {
                if prev_ts.is_some() {
                    index += 1;
                }
                sessions += 1;
            }
            prev_ts = Some(event.event_ts);

            tagged.push(SessionEvent {
                session_id: format!("{key}_{index}"),
                event: event.clone(),
            });
        }
    }

    info!(
        events = tagged.len(),
        identities,
        sessions,
        timeout_minutes = timeout.num_minutes(),
        "Assigned sessions"
    );
    tagged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{event, ts};

    fn ids(tagged: &[SessionEvent]) -> Vec<(usize, &str)> {
        tagged
            .iter()
            .map(|t| (t.event.seq, t.session_id.as_str()))
            .collect()
    }

    #[test]
    fn test_gap_splits_sessions() {
        // 10:00 and 10:20 share a session; 11:00 is 40 minutes after 10:20.
        let events = vec![
            event(0, Some("x"), "page_view", ts(1, 10, 0)),
            event(1, Some("x"), "page_view", ts(1, 10, 20)),
            event(2, Some("x"), "page_view", ts(1, 11, 0)),
        ];
        let tagged = assign_sessions(&events, Duration::minutes(30));
        assert_eq!(ids(&tagged), vec![(0, "x_0"), (1, "x_0"), (2, "x_1")]);
    }

    #[test]
    fn test_gap_equal_to_timeout_stays_in_session() {
        let events = vec![
            event(0, Some("x"), "page_view", ts(1, 10, 0)),
            event(1, Some("x"), "page_view", ts(1, 10, 30)),
            event(2, Some("x"), "page_view", ts(1, 11, 1)),
        ];
        let tagged = assign_sessions(&events, Duration::minutes(30));
        assert_eq!(ids(&tagged), vec![(0, "x_0"), (1, "x_0"), (2, "x_1")]);
    }

    #[test]
    fn test_anonymous_events_are_singletons() {
        let events = vec![
            event(0, None, "page_view", ts(1, 10, 0)),
            event(1, None, "page_view", ts(1, 10, 1)),
            event(2, Some("x"), "page_view", ts(1, 10, 2)),
        ];
        let tagged = assign_sessions(&events, Duration::minutes(30));
        let mut got = ids(&tagged);
        got.sort();
        assert_eq!(
            got,
            vec![(0, "anon_event_0_0"), (1, "anon_event_1_0"), (2, "x_0")]
        );
    }

    #[test]
    fn test_client_named_like_anonymous_key_stays_separate() {
        let events = vec![
            event(0, Some("anon_event_1"), "page_view", ts(1, 10, 0)),
            event(1, None, "page_view", ts(1, 10, 5)),
            event(2, Some("~anon_event_1"), "page_view", ts(1, 10, 6)),
        ];
        let tagged = assign_sessions(&events, Duration::minutes(30));
        let mut got = ids(&tagged);
        got.sort();
        assert_eq!(
            got,
            vec![
                (0, "~anon_event_1_0"),
                (1, "anon_event_1_0"),
                (2, "~~anon_event_1_0"),
            ]
        );
    }

    #[test]
    fn test_identity_keys() {
        assert_eq!(Identity::Client("x".into()).to_string(), "x");
        assert_eq!(Identity::Client("~x".into()).to_string(), "~~x");
        assert_eq!(Identity::Anonymous(7).to_string(), "anon_event_7");
    }

    #[test]
    fn test_unsorted_input_and_tie_break_by_seq() {
        let events = vec![
            event(0, Some("x"), "b", ts(1, 12, 0)),
            event(1, Some("x"), "a", ts(1, 10, 0)),
            event(2, Some("x"), "c", ts(1, 10, 0)),
        ];
        let tagged = assign_sessions(&events, Duration::minutes(30));
        let order: Vec<_> = tagged.iter().map(|t| t.event.seq).collect();
        assert_eq!(order, vec![1, 2, 0]);
        assert_eq!(ids(&tagged), vec![(1, "x_0"), (2, "x_0"), (0, "x_1")]);
    }

    #[test]
    fn test_every_event_tagged_and_deterministic() {
        let events: Vec<_> = (0..50)
            .map(|i| {
                let client = match i % 3 {
                    0 => Some("a"),
                    1 => Some("b"),
                    _ => None,
                };
                event(i, client, "page_view", ts(1 + (i as u32 % 2), (i as u32 * 7) % 24, 0))
            })
            .collect();

        let first = assign_sessions(&events, Duration::minutes(30));
        let second = assign_sessions(&events, Duration::minutes(30));
        assert_eq!(first.len(), events.len());
        assert_eq!(first, second);
    }
}
