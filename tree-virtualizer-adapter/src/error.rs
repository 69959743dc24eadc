use tree_virtualizer::TreeError;

/// Errors reported by [`crate::TreeStore`] mutations.
///
/// Store-side checks run before any notification reaches the reflector, so a rejected mutation
/// leaves both the store and the mirror untouched.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("parent is not part of the store")]
    UnknownParent,
    #[error("key is not part of the store")]
    UnknownKey,
    #[error("key is already part of the store")]
    DuplicateKey,
    #[error("rows {first}..={last} are out of bounds")]
    OutOfBounds { first: usize, last: usize },
    #[error("rows cannot be moved into their own subtree")]
    MoveIntoSelf,
    #[error(transparent)]
    Reflector(#[from] TreeError),
}

pub type StoreResult<T> = core::result::Result<T, StoreError>;
