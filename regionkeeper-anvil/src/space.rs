//! Sorted set of byte ranges, used to work out which parts of a region file
//! hold no chunk data.

use std::collections::BTreeMap;
use std::fmt;

/// A half-open byte range `[offset, offset + length)`, or everything from
/// `offset` to the end of the file and beyond.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    Bounded { offset: u64, length: u64 },
    OpenEnded { offset: u64 },
}

impl Space {
    pub fn bounded(offset: u64, length: u64) -> Self {
        Space::Bounded { offset, length }
    }

    pub fn open_ended(offset: u64) -> Self {
        Space::OpenEnded { offset }
    }

    pub fn offset(&self) -> u64 {
        match *self {
            Space::Bounded { offset, .. } | Space::OpenEnded { offset } => offset,
        }
    }

    /// Exclusive end, `None` when open-ended.
    pub fn end(&self) -> Option<u64> {
        match *self {
            Space::Bounded { offset, length } => Some(offset + length),
            Space::OpenEnded { .. } => None,
        }
    }

    /// True if `self` overlaps or touches a range starting at `offset`.
    fn reaches(&self, offset: u64) -> bool {
        self.end().is_none_or(|end| end >= offset)
    }

    /// Union of `self` and a range it reaches, keeping `self`'s start.
    fn merge(self, other: Space) -> Space {
        let start = self.offset().min(other.offset());
        match (self.end(), other.end()) {
            (Some(a), Some(b)) => Space::bounded(start, a.max(b) - start),
            _ => Space::open_ended(start),
        }
    }
}

/// Ordered, non-overlapping ranges keyed by start offset. Touching ranges are
/// merged on insert, so the set is always minimal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpaceList {
    spaces: BTreeMap<u64, Space>,
}

impl SpaceList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, space: Space) {
        let mut space = space;

        // Left neighbour: the stored range starting at or before us
        let previous = self
            .spaces
            .range(..=space.offset())
            .next_back()
            .map(|(_, s)| *s);
        if let Some(previous) = previous {
            if previous.reaches(space.offset()) {
                self.spaces.remove(&previous.offset());
                space = previous.merge(space);
            }
        }

        // Right neighbours: everything starting after us that we now reach
        loop {
            let next = self
                .spaces
                .range(space.offset()..)
                .next()
                .map(|(_, s)| *s);
            match next {
                Some(next) if space.reaches(next.offset()) => {
                    self.spaces.remove(&next.offset());
                    space = space.merge(next);
                }
                _ => break,
            }
        }

        self.spaces.insert(space.offset(), space);
    }

    /// Complement over `[0, ∞)`.
    pub fn flip(&self) -> SpaceList {
        let mut flipped = SpaceList::new();
        let mut cursor = Some(0u64);

        for space in self.spaces.values() {
            let Some(start) = cursor else { break };
            if space.offset() > start {
                flipped.add(Space::bounded(start, space.offset() - start));
            }
            cursor = space.end();
        }

        if let Some(start) = cursor {
            flipped.add(Space::open_ended(start));
        }
        flipped
    }

    pub fn iter(&self) -> impl Iterator<Item = Space> + '_ {
        self.spaces.values().copied()
    }

    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }
}

impl fmt::Display for SpaceList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, space) in self.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            match space.end() {
                Some(end) => write!(f, "{} -> {}", space.offset(), end)?,
                None => write!(f, "{} -> forever", space.offset())?,
            }
        }
        Ok(())
    }
}
