//! File handles.

use std::fmt;

/// Handle for a source file registered with the semantic model.
///
/// Ids are handed out in registration order and never reused within a
/// session, so a stale `FileId` simply stops resolving instead of pointing
/// at somebody else's tree.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct FileId(pub u32);

impl FileId {
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_id_display() {
        assert_eq!(FileId::new(3).to_string(), "file#3");
        assert_eq!(format!("{:?}", FileId::new(3)), "FileId(3)");
    }

    #[test]
    fn test_file_id_ordering() {
        let mut ids = vec![FileId::new(2), FileId::new(0), FileId::new(1)];
        ids.sort();
        assert_eq!(ids, vec![FileId::new(0), FileId::new(1), FileId::new(2)]);
        assert_eq!(FileId::new(2).index(), 2);
    }
}
