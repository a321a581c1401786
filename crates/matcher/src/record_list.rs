use ingest::Record;

/// Ordered records of one side of one type.
///
/// After [`RecordList::sort`] the position of a record is its index for the
/// rest of the run; every other structure refers to records by that index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordList {
    records: Vec<Record>,
}

impl RecordList {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Order records by external id (stable for equal ids).
    pub fn sort(&mut self) {
        self.records.sort_by(|a, b| a.id().cmp(b.id()));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn values(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    /// External id of the record at `index`.
    pub fn id_at(&self, index: usize) -> Option<&str> {
        self.records.get(index).map(Record::id)
    }
}
