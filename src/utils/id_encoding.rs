//! Repository-based id encoding
//!
//! Instance ids generated by the store are composite values that carry the
//! repository (briefcase) that created them in the high bits.
//!
//! ## Encoding Scheme
//!
//! 64-bit id layout:
//! ```text
//! [32-bit repository_id][32-bit local_id]
//! ```
//!
//! - **repository_id** (bits 32-63): the repository that generated the id
//! - **local_id** (bits 0-31): monotonically increasing per repository, starting at 1
//!
//! A local id of 0 is never generated, so `0` and `-1` are both invalid ids.
//!
//! ## Usage
//!
//! ```ignore
//! let id = RepositoryBasedId::new(5, 42);
//! assert_eq!(id.value(), (5i64 << 32) | 42);
//! assert_eq!(id.repository_id(), 5);
//! assert_eq!(id.local_id(), 42);
//! ```

use std::fmt;

/// Largest repository id that keeps packed ids positive.
pub const MAX_REPOSITORY_ID: u32 = i32::MAX as u32;

/// Largest local id a repository can issue.
pub const MAX_LOCAL_ID: u32 = u32::MAX;

const LOCAL_ID_MASK: i64 = 0xFFFF_FFFF;

/// Composite id: repository id in the high 32 bits, local id in the low 32 bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepositoryBasedId(i64);

impl RepositoryBasedId {
    /// Pack a repository id and a local id into one value
    #[inline]
    pub fn new(repository_id: u32, local_id: u32) -> Self {
        RepositoryBasedId(((repository_id as i64) << 32) | local_id as i64)
    }

    /// First value of a repository's range, used as the counter's reset value.
    /// The local part is 0 and therefore never handed out.
    #[inline]
    pub fn range_start(repository_id: u32) -> Self {
        Self::new(repository_id, 0)
    }

    #[inline]
    pub fn from_value(value: i64) -> Self {
        RepositoryBasedId(value)
    }

    #[inline]
    pub fn value(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn repository_id(self) -> u32 {
        ((self.0 >> 32) & LOCAL_ID_MASK) as u32
    }

    #[inline]
    pub fn local_id(self) -> u32 {
        (self.0 & LOCAL_ID_MASK) as u32
    }

    /// `0`, `-1` and any value whose local part is 0 are not valid ids
    #[inline]
    pub fn is_valid(self) -> bool {
        self.0 > 0 && self.local_id() != 0
    }
}

impl From<RepositoryBasedId> for i64 {
    fn from(id: RepositoryBasedId) -> Self {
        id.0
    }
}

impl fmt::Display for RepositoryBasedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository_id(), self.local_id())
    }
}
