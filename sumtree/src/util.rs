pub(crate) trait IterExt<'a>: Iterator + Sized {
    fn boxed(self) -> BoxedIter<'a, Self::Item>;
}

pub type BoxedIter<'a, T> = Box<dyn Iterator<Item = T> + Send + 'a>;

impl<'a, T: Iterator + Sized + Send + 'a> IterExt<'a> for T {
    fn boxed(self) -> BoxedIter<'a, Self::Item> {
        Box::new(self)
    }
}

/// true if the items are strictly increasing
pub(crate) fn is_strictly_sorted<T: Ord>(items: &[T]) -> bool {
    items.windows(2).all(|x| x[0] < x[1])
}
