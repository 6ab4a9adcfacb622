//! Named column families (§4.1). Each is backed by its own append-only log
//! file under the tenant's data directory.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColumnFamily {
    Default,
    Entities,
    EdgesFwd,
    EdgesRev,
    Indexes,
    EmbeddingsMeta,
    Schemas,
    MomentsTime,
    Wal,
    Meta,
}

impl ColumnFamily {
    pub const ALL: [ColumnFamily; 10] = [
        ColumnFamily::Default,
        ColumnFamily::Entities,
        ColumnFamily::EdgesFwd,
        ColumnFamily::EdgesRev,
        ColumnFamily::Indexes,
        ColumnFamily::EmbeddingsMeta,
        ColumnFamily::Schemas,
        ColumnFamily::MomentsTime,
        ColumnFamily::Wal,
        ColumnFamily::Meta,
    ];

    /// The on-disk file stem for this column family's log file.
    pub fn file_stem(self) -> &'static str {
        match self {
            ColumnFamily::Default => "default",
            ColumnFamily::Entities => "entities",
            ColumnFamily::EdgesFwd => "edges_fwd",
            ColumnFamily::EdgesRev => "edges_rev",
            ColumnFamily::Indexes => "indexes",
            ColumnFamily::EmbeddingsMeta => "embeddings_meta",
            ColumnFamily::Schemas => "schemas",
            ColumnFamily::MomentsTime => "moments_time",
            ColumnFamily::Wal => "wal",
            ColumnFamily::Meta => "meta",
        }
    }
}

impl fmt::Display for ColumnFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_stem())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn every_cf_has_a_distinct_stem() {
        let mut stems: Vec<&str> = ColumnFamily::ALL.iter().map(|cf| cf.file_stem()).collect();
        stems.sort();
        stems.dedup();
        assert_eq!(stems.len(), ColumnFamily::ALL.len());
    }
}
