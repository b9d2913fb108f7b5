use crate::validation::CrdDeletionValidator;

pub(crate) struct ApiServerState {
    pub(crate) validator: CrdDeletionValidator,
}
