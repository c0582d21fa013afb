/// Fold another instance of the same type into `self`.
pub trait Mergeable {
    type Error;

    fn merge(&mut self, other: &Self) -> Result<(), Self::Error>;
}
