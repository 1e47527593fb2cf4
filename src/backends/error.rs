#[derive(thiserror::Error, Debug, PartialEq)]
pub enum BackendsError {
    #[error("point: invalid input lenght: expected {expected}, received {received}")]
    PointInputLen { expected: usize, received: usize },
    #[error("point: failed to serialize")]
    PointSerialize,
    #[error("point: input is not canonical or not in the subgroup")]
    PointDeserialize,
    #[error("scalar: invalid input lenght")]
    ScalarInputLen,
    #[error("scalar: failed to serialize")]
    ScalarSerialize,
    #[error("scalar: input is not canonical")]
    ScalarDeserialize,
    #[error("scalar: not invertable")]
    ScalarNonInvertable,
}
