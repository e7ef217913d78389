//! Filter slot registry and the command queue that mutates it.
//!
//! Producers on any thread push [`FilterCommand`]s through a [`FilterSender`];
//! the render worker drains at most one command per tick and applies it to its
//! [`FilterChain`]. Keeping mutation on the worker means a draw in flight always
//! sees a consistent list without taking a lock on the render path.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

/// A visual effect applied to the composition buffer.
///
/// Filters are expressed as a WGSL function with the signature
/// `fn apply_filter(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32>`; the GPU
/// backend wraps it with a prelude exposing `sample_source(uv)` and a `frame`
/// uniform (`resolution`, `texel`). Other backends may ignore the source.
pub trait FilterRender: Send + Sync {
    /// Short human-readable name used in logs.
    fn label(&self) -> &str;

    /// WGSL source defining `apply_filter`.
    fn shader_source(&self) -> Cow<'_, str>;
}

/// Stable identity of a filter instance, used for removal and pipeline caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(u64);

static NEXT_FILTER_ID: AtomicU64 = AtomicU64::new(1);

/// Cheaply clonable handle to a filter. Clones share identity.
#[derive(Clone)]
pub struct FilterHandle {
    id: FilterId,
    render: Arc<dyn FilterRender>,
}

impl FilterHandle {
    pub fn new(render: impl FilterRender + 'static) -> Self {
        Self::from_arc(Arc::new(render))
    }

    pub fn from_arc(render: Arc<dyn FilterRender>) -> Self {
        Self {
            id: FilterId(NEXT_FILTER_ID.fetch_add(1, Ordering::Relaxed)),
            render,
        }
    }

    pub fn id(&self) -> FilterId {
        self.id
    }

    pub fn label(&self) -> &str {
        self.render.label()
    }

    pub fn shader_source(&self) -> Cow<'_, str> {
        self.render.shader_source()
    }
}

impl PartialEq for FilterHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FilterHandle {}

impl fmt::Debug for FilterHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterHandle")
            .field("id", &self.id.0)
            .field("label", &self.label())
            .finish()
    }
}

/// A filter described directly by its WGSL source.
#[derive(Debug, Clone)]
pub struct ShaderFilter {
    label: String,
    source: String,
}

impl ShaderFilter {
    pub fn new(label: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            source: source.into(),
        }
    }
}

impl FilterRender for ShaderFilter {
    fn label(&self) -> &str {
        &self.label
    }

    fn shader_source(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.source)
    }
}

/// Mutation requested against the filter registry.
#[derive(Debug, Clone)]
pub enum FilterCommand {
    /// Replace the filter in slot 0, or append when the registry is empty.
    Set(FilterHandle),
    SetAt { index: usize, filter: FilterHandle },
    Add(FilterHandle),
    AddAt { index: usize, filter: FilterHandle },
    Remove(FilterHandle),
    RemoveAt(usize),
    Clear,
}

impl FilterCommand {
    fn name(&self) -> &'static str {
        match self {
            FilterCommand::Set(_) => "set",
            FilterCommand::SetAt { .. } => "set_at",
            FilterCommand::Add(_) => "add",
            FilterCommand::AddAt { .. } => "add_at",
            FilterCommand::Remove(_) => "remove",
            FilterCommand::RemoveAt(_) => "remove_at",
            FilterCommand::Clear => "clear",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("filter index {index} is out of range for {len} active filters")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("filter {0:?} is not active")]
    NotFound(FilterId),
}

/// Ordered list of active filters; composition order is list order.
#[derive(Debug, Default)]
pub struct FilterChain {
    filters: Vec<FilterHandle>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn filters(&self) -> &[FilterHandle] {
        &self.filters
    }

    /// Applies a command. Errors leave the chain untouched.
    pub fn apply(&mut self, command: FilterCommand) -> Result<(), FilterError> {
        match command {
            FilterCommand::Set(filter) => {
                match self.filters.first_mut() {
                    Some(slot) => *slot = filter,
                    None => self.filters.push(filter),
                }
                Ok(())
            }
            FilterCommand::SetAt { index, filter } => {
                let len = self.filters.len();
                let slot = self
                    .filters
                    .get_mut(index)
                    .ok_or(FilterError::IndexOutOfRange { index, len })?;
                *slot = filter;
                Ok(())
            }
            FilterCommand::Add(filter) => {
                self.filters.push(filter);
                Ok(())
            }
            FilterCommand::AddAt { index, filter } => {
                self.check_index(index)?;
                self.filters.insert(index, filter);
                Ok(())
            }
            FilterCommand::Remove(filter) => {
                let position = self
                    .filters
                    .iter()
                    .position(|active| *active == filter)
                    .ok_or(FilterError::NotFound(filter.id()))?;
                self.filters.remove(position);
                Ok(())
            }
            FilterCommand::RemoveAt(index) => {
                self.check_index(index)?;
                self.filters.remove(index);
                Ok(())
            }
            FilterCommand::Clear => {
                self.filters.clear();
                Ok(())
            }
        }
    }

    fn check_index(&self, index: usize) -> Result<(), FilterError> {
        if index < self.filters.len() {
            Ok(())
        } else {
            Err(FilterError::IndexOutOfRange {
                index,
                len: self.filters.len(),
            })
        }
    }
}

/// Producer side of the filter queue. Clonable and usable from any thread.
#[derive(Debug, Clone)]
pub struct FilterSender {
    sender: Sender<FilterCommand>,
}

impl FilterSender {
    pub fn send(&self, command: FilterCommand) {
        // The receiver lives as long as the facade that owns this sender.
        if self.sender.send(command).is_err() {
            tracing::debug!("filter queue closed; command dropped");
        }
    }

    pub fn pending(&self) -> usize {
        self.sender.len()
    }
}

/// Worker side of the filter queue.
#[derive(Debug)]
pub struct FilterReceiver {
    receiver: Receiver<FilterCommand>,
    active: Arc<AtomicUsize>,
}

impl FilterReceiver {
    /// Applies at most one queued command. Returns `true` when one was taken.
    pub fn drain_one(&self, chain: &mut FilterChain) -> bool {
        let command = match self.receiver.try_recv() {
            Ok(command) => command,
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return false,
        };
        let name = command.name();
        match chain.apply(command) {
            Ok(()) => {
                tracing::debug!(command = name, active = chain.len(), "applied filter command");
            }
            Err(error) => {
                tracing::warn!(command = name, %error, "ignored filter command");
            }
        }
        self.active.store(chain.len(), Ordering::Relaxed);
        true
    }

    /// Number of filters active after the last applied command.
    pub fn active_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.active)
    }
}

/// Creates a connected, unbounded filter queue.
pub fn filter_queue() -> (FilterSender, FilterReceiver) {
    let (sender, receiver) = unbounded();
    (
        FilterSender { sender },
        FilterReceiver {
            receiver,
            active: Arc::new(AtomicUsize::new(0)),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(label: &str) -> FilterHandle {
        FilterHandle::new(ShaderFilter::new(
            label,
            "fn apply_filter(color: vec4<f32>, uv: vec2<f32>) -> vec4<f32> { return color; }",
        ))
    }

    fn labels(chain: &FilterChain) -> Vec<&str> {
        chain.filters().iter().map(|f| f.label()).collect()
    }

    #[test]
    fn set_uses_slot_zero() {
        let mut chain = FilterChain::new();
        chain.apply(FilterCommand::Set(filter("a"))).unwrap();
        assert_eq!(labels(&chain), ["a"]);
        chain.apply(FilterCommand::Add(filter("b"))).unwrap();
        chain.apply(FilterCommand::Set(filter("c"))).unwrap();
        assert_eq!(labels(&chain), ["c", "b"]);
    }

    #[test]
    fn indexed_operations_respect_bounds() {
        let mut chain = FilterChain::new();
        chain.apply(FilterCommand::Add(filter("a"))).unwrap();
        chain.apply(FilterCommand::Add(filter("b"))).unwrap();
        chain
            .apply(FilterCommand::AddAt {
                index: 1,
                filter: filter("x"),
            })
            .unwrap();
        assert_eq!(labels(&chain), ["a", "x", "b"]);
        chain
            .apply(FilterCommand::SetAt {
                index: 2,
                filter: filter("y"),
            })
            .unwrap();
        assert_eq!(labels(&chain), ["a", "x", "y"]);
        chain.apply(FilterCommand::RemoveAt(0)).unwrap();
        assert_eq!(labels(&chain), ["x", "y"]);
    }

    #[test]
    fn out_of_range_index_is_a_no_op() {
        let mut chain = FilterChain::new();
        chain.apply(FilterCommand::Add(filter("a"))).unwrap();
        let err = chain.apply(FilterCommand::RemoveAt(1)).unwrap_err();
        assert_eq!(err, FilterError::IndexOutOfRange { index: 1, len: 1 });
        assert!(chain
            .apply(FilterCommand::SetAt {
                index: 5,
                filter: filter("b"),
            })
            .is_err());
        assert!(chain
            .apply(FilterCommand::AddAt {
                index: 1,
                filter: filter("c"),
            })
            .is_err());
        assert_eq!(labels(&chain), ["a"]);
    }

    #[test]
    fn remove_matches_identity_not_label() {
        let mut chain = FilterChain::new();
        let first = filter("same");
        let second = filter("same");
        chain.apply(FilterCommand::Add(first.clone())).unwrap();
        chain.apply(FilterCommand::Add(second.clone())).unwrap();
        chain.apply(FilterCommand::Remove(second.clone())).unwrap();
        assert_eq!(chain.filters(), &[first.clone()]);
        assert_eq!(
            chain.apply(FilterCommand::Remove(second.clone())),
            Err(FilterError::NotFound(second.id()))
        );
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn length_tracks_adds_minus_successful_removes() {
        let mut chain = FilterChain::new();
        let handles: Vec<_> = (0..8).map(|i| filter(&format!("f{i}"))).collect();
        let mut adds = 0usize;
        let mut removes = 0usize;
        for (step, handle) in handles.iter().enumerate() {
            chain.apply(FilterCommand::Add(handle.clone())).unwrap();
            adds += 1;
            if step % 3 == 2 {
                if chain.apply(FilterCommand::RemoveAt(step * 10)).is_ok() {
                    removes += 1;
                }
                if chain.apply(FilterCommand::Remove(handles[step - 1].clone())).is_ok() {
                    removes += 1;
                }
            }
        }
        assert_eq!(chain.len(), adds - removes);
        chain.apply(FilterCommand::Clear).unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn queue_drains_one_command_per_call() {
        let (sender, receiver) = filter_queue();
        let mut chain = FilterChain::new();
        sender.send(FilterCommand::Add(filter("a")));
        sender.send(FilterCommand::Add(filter("b")));
        sender.send(FilterCommand::RemoveAt(9));
        assert_eq!(sender.pending(), 3);

        assert!(receiver.drain_one(&mut chain));
        assert_eq!(chain.len(), 1);
        assert!(receiver.drain_one(&mut chain));
        assert!(receiver.drain_one(&mut chain));
        assert_eq!(chain.len(), 2);
        assert!(!receiver.drain_one(&mut chain));
        assert_eq!(receiver.active_count().load(Ordering::Relaxed), 2);
    }
}
