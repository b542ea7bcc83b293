use crate::error::StoreError;
use crate::store::DataPoint;
use fjall::Partition;
use self_cell::self_cell;

type BoxedScan<'a> = Box<dyn Iterator<Item = Result<DataPoint, StoreError>> + 'a>;

self_cell!(
    /// Scan over one series partition, owning the partition handle it
    /// borrows from.
    pub struct Reader {
        owner: Partition,

        #[covariant]
        dependent: BoxedScan,
    }
);

impl Iterator for Reader {
    type Item = Result<DataPoint, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.with_dependent_mut(|_, iter| iter.next())
    }
}
