//! Event reference collection
//!
//! An event coprocessor keeps no table. It reads a stream id and an event id
//! from each row and collects the references that fall within an inclusive
//! `[min_event, max_event]` window, bounded by the number of streams, the
//! total number of events and the events kept per stream. Lower references
//! win when a bound is hit.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::codec::{CodecResult, Input, Output};
use crate::expression::Val;
use crate::store::{read_frame, write_frame, CompletionLatch, CompletionState, StoreResult};

/// One event within one stream. Orders by stream, then event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventRef {
    pub stream_id: i64,
    pub event_id: i64,
}

impl EventRef {
    pub fn new(stream_id: i64, event_id: i64) -> Self {
        Self { stream_id, event_id }
    }
}

fn unlimited() -> usize {
    usize::MAX
}

fn event_id_field() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSettings {
    pub component_id: String,

    #[serde(default)]
    pub min_event: Option<EventRef>,
    #[serde(default)]
    pub max_event: Option<EventRef>,

    #[serde(default = "unlimited")]
    pub max_streams: usize,
    #[serde(default = "unlimited")]
    pub max_events: usize,
    #[serde(default = "unlimited")]
    pub max_events_per_stream: usize,

    /// Row positions holding the stream and event ids
    #[serde(default)]
    pub stream_id_field: usize,
    #[serde(default = "event_id_field")]
    pub event_id_field: usize,
}

impl EventSettings {
    pub fn new(component_id: impl Into<String>) -> Self {
        Self {
            component_id: component_id.into(),
            min_event: None,
            max_event: None,
            max_streams: unlimited(),
            max_events: unlimited(),
            max_events_per_stream: unlimited(),
            stream_id_field: 0,
            event_id_field: event_id_field(),
        }
    }

    pub fn between(mut self, min_event: EventRef, max_event: EventRef) -> Self {
        self.min_event = Some(min_event);
        self.max_event = Some(max_event);
        self
    }

    pub fn limits(mut self, max_streams: usize, max_events: usize, max_events_per_stream: usize) -> Self {
        self.max_streams = max_streams;
        self.max_events = max_events;
        self.max_events_per_stream = max_events_per_stream;
        self
    }
}

/// A bounded set of event references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRefs {
    settings: EventSettings,
    refs: Vec<EventRef>,
    reached_limit: bool,
}

impl EventRefs {
    pub fn new(settings: EventSettings) -> Self {
        Self {
            settings,
            refs: Vec::new(),
            reached_limit: false,
        }
    }

    /// Add a reference if it lies inside the window. Call `trim` to apply
    /// the limits.
    pub fn add(&mut self, event: EventRef) {
        let above_min = self.settings.min_event.map_or(true, |min| event >= min);
        let below_max = self.settings.max_event.map_or(true, |max| event <= max);
        if above_min && below_max {
            self.refs.push(event);
        }
    }

    /// Sort, drop duplicates and cut to the stream and event limits.
    pub fn trim(&mut self) {
        self.refs.sort_unstable();
        self.refs.dedup();

        let mut kept = Vec::with_capacity(self.refs.len().min(self.settings.max_events));
        let mut current_stream = None;
        let mut streams = 0usize;
        let mut in_stream = 0usize;
        for event in self.refs.drain(..) {
            if current_stream != Some(event.stream_id) {
                if streams >= self.settings.max_streams {
                    self.reached_limit = true;
                    break;
                }
                current_stream = Some(event.stream_id);
                streams += 1;
                in_stream = 0;
            }
            if in_stream >= self.settings.max_events_per_stream {
                continue;
            }
            if kept.len() >= self.settings.max_events {
                self.reached_limit = true;
                break;
            }
            in_stream += 1;
            kept.push(event);
        }
        self.refs = kept;
    }

    pub fn refs(&self) -> &[EventRef] {
        &self.refs
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn reached_limit(&self) -> bool {
        self.reached_limit
    }

    fn take(&mut self) -> Vec<EventRef> {
        std::mem::take(&mut self.refs)
    }
}

/// Collects event references for one component.
pub struct EventCoprocessor {
    settings: EventSettings,
    refs: Mutex<EventRefs>,
    completion: CompletionLatch,
}

impl EventCoprocessor {
    pub fn new(settings: EventSettings) -> Self {
        Self {
            refs: Mutex::new(EventRefs::new(settings.clone())),
            settings,
            completion: CompletionLatch::new(),
        }
    }

    pub fn settings(&self) -> &EventSettings {
        &self.settings
    }

    /// Rows without integer ids at the configured positions are ignored.
    pub fn accept(&self, values: &[Val]) {
        let stream_id = values.get(self.settings.stream_id_field).and_then(Val::as_i64);
        let event_id = values.get(self.settings.event_id_field).and_then(Val::as_i64);
        let (Some(stream_id), Some(event_id)) = (stream_id, event_id) else {
            return;
        };

        let mut refs = self.refs.lock().unwrap_or_else(|e| e.into_inner());
        refs.add(EventRef::new(stream_id, event_id));
        if refs.len() >= self.settings.max_events.saturating_mul(2) {
            refs.trim();
        }
    }

    /// The trimmed references collected so far.
    pub fn event_refs(&self) -> EventRefs {
        let mut refs = self.refs.lock().unwrap_or_else(|e| e.into_inner());
        refs.trim();
        refs.clone()
    }

    pub fn completion_state(&self) -> &dyn CompletionState {
        &self.completion
    }

    pub fn clear(&self) {
        *self.refs.lock().unwrap_or_else(|e| e.into_inner()) = EventRefs::new(self.settings.clone());
        self.completion.release();
    }

    /// Move every collected reference into one payload.
    pub fn write_payload(&self, output: &mut Output) -> StoreResult<()> {
        let taken = {
            let mut refs = self.refs.lock().unwrap_or_else(|e| e.into_inner());
            refs.trim();
            refs.take()
        };

        let payloads = if taken.is_empty() {
            Vec::new()
        } else {
            let mut payload = Output::with_capacity(taken.len() * 16);
            for event in &taken {
                payload.write_i64(event.stream_id);
                payload.write_i64(event.event_id);
            }
            vec![payload.into_bytes()]
        };
        write_frame(output, &payloads)?;
        Ok(())
    }

    /// Merge references from a payload. Returns `false` once a limit is hit.
    pub fn read_payload(&self, input: &mut Input<'_>) -> StoreResult<bool> {
        let mut incoming = Vec::new();
        for payload in read_frame(input)? {
            read_refs(payload, &mut incoming)?;
        }

        let mut refs = self.refs.lock().unwrap_or_else(|e| e.into_inner());
        for event in incoming {
            refs.add(event);
        }
        refs.trim();
        Ok(!refs.reached_limit())
    }
}

fn read_refs(payload: &[u8], into: &mut Vec<EventRef>) -> CodecResult<()> {
    let mut input = Input::new(payload);
    while !input.is_empty() {
        let stream_id = input.read_i64()?;
        let event_id = input.read_i64()?;
        into.push(EventRef::new(stream_id, event_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(settings: EventSettings, events: &[(i64, i64)]) -> EventRefs {
        let mut refs = EventRefs::new(settings);
        for (stream, event) in events {
            refs.add(EventRef::new(*stream, *event));
        }
        refs.trim();
        refs
    }

    fn pairs(refs: &EventRefs) -> Vec<(i64, i64)> {
        refs.refs().iter().map(|r| (r.stream_id, r.event_id)).collect()
    }

    #[test]
    fn test_window_is_inclusive() {
        let settings = EventSettings::new("events").between(EventRef::new(2, 5), EventRef::new(3, 1));
        let refs = refs(settings, &[(1, 9), (2, 4), (2, 5), (2, 9), (3, 1), (3, 2)]);
        assert_eq!(pairs(&refs), vec![(2, 5), (2, 9), (3, 1)]);
        assert!(!refs.reached_limit());
    }

    #[test]
    fn test_sorted_and_deduplicated() {
        let refs = refs(EventSettings::new("events"), &[(2, 1), (1, 3), (2, 1), (1, 1)]);
        assert_eq!(pairs(&refs), vec![(1, 1), (1, 3), (2, 1)]);
    }

    #[test]
    fn test_per_stream_limit_skips_without_stopping() {
        let settings = EventSettings::new("events").limits(usize::MAX, usize::MAX, 2);
        let refs = refs(settings, &[(1, 1), (1, 2), (1, 3), (2, 1)]);
        assert_eq!(pairs(&refs), vec![(1, 1), (1, 2), (2, 1)]);
        assert!(!refs.reached_limit());
    }

    #[test]
    fn test_stream_and_event_limits_stop() {
        let by_streams = refs(
            EventSettings::new("events").limits(2, usize::MAX, usize::MAX),
            &[(1, 1), (2, 1), (3, 1)],
        );
        assert_eq!(pairs(&by_streams), vec![(1, 1), (2, 1)]);
        assert!(by_streams.reached_limit());

        let by_events = refs(
            EventSettings::new("events").limits(usize::MAX, 3, usize::MAX),
            &[(1, 1), (1, 2), (2, 1), (2, 2)],
        );
        assert_eq!(pairs(&by_events), vec![(1, 1), (1, 2), (2, 1)]);
        assert!(by_events.reached_limit());
    }

    #[test]
    fn test_accept_reads_configured_fields() {
        let mut settings = EventSettings::new("events");
        settings.stream_id_field = 2;
        settings.event_id_field = 0;
        let coprocessor = EventCoprocessor::new(settings);
        coprocessor.accept(&[Val::Integer(7), Val::from("ignored"), Val::Integer(3)]);
        coprocessor.accept(&[Val::from("not a number"), Val::Null, Val::Integer(3)]);
        assert_eq!(pairs(&coprocessor.event_refs()), vec![(3, 7)]);
    }

    #[test]
    fn test_payload_moves_refs() {
        let source = EventCoprocessor::new(EventSettings::new("events"));
        for (stream, event) in [(2, 1), (1, 4)] {
            source.accept(&[Val::Integer(stream), Val::Integer(event)]);
        }
        let mut out = Output::new();
        source.write_payload(&mut out).unwrap();
        assert!(source.event_refs().is_empty());
        let bytes = out.into_bytes();

        let target = EventCoprocessor::new(EventSettings::new("events").limits(usize::MAX, 2, usize::MAX));
        target.accept(&[Val::Integer(1), Val::Integer(1)]);
        assert!(!target.read_payload(&mut Input::new(&bytes)).unwrap());
        assert_eq!(pairs(&target.event_refs()), vec![(1, 1), (1, 4)]);
    }

    #[test]
    fn test_clear_releases_completion() {
        let coprocessor = EventCoprocessor::new(EventSettings::new("events"));
        coprocessor.accept(&[Val::Integer(1), Val::Integer(1)]);
        coprocessor.clear();
        assert!(coprocessor.event_refs().is_empty());
        assert!(coprocessor.completion_state().is_complete());
    }
}
