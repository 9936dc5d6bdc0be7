// SPDX-License-Identifier: Apache-2.0
//! Error taxonomy for [`crate::graph::GraphModel`] operations.
use thiserror::Error;

/// Errors surfaced by public [`crate::graph::GraphModel`] operations.
///
/// Validation and invariant errors are surfaced at the originating
/// operation and prevent mutation; execution never raises for
/// "semantic" conditions (empty buffer, zero-weight router, disabled
/// edge, failed guard) — those are modeled as "produce nothing".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// `addNode`/`addEdge` supplied an id that is already in use.
    #[error("id already exists")]
    IdAlreadyExists,
    /// `setLabel`/`addNode` supplied a label already bound to another element.
    #[error("duplicate label")]
    DuplicateLabel,
    /// An operation referenced an id with no corresponding element.
    #[error("id not found")]
    IdNotFound,
    /// `addEdge` supplied an edge id already in use.
    #[error("edge id already exists")]
    EdgeIdAlreadyExists,
    /// `addEdge` referenced an endpoint id that is not a live element.
    #[error("connecting Node with non-existing id")]
    ConnectingNonExistingId,
    /// `addEdge` specified the same element as both endpoints.
    #[error("cannot connect to self")]
    CannotConnectToSelf,
    /// `addEdge` specified an edge as the source endpoint.
    #[error("edge must not start from edge")]
    EdgeMustNotStartFromEdge,
    /// `addEdge` specified an edge as the destination endpoint.
    #[error("edge must not point to edge")]
    EdgeMustNotPointToEdge,
    /// An Exchanger endpoint was connected without a `swapInputIndex`.
    #[error("missing swap input index")]
    MissingSwapInputIndex,
    /// `setGateOutputWeight` was called with a negative weight.
    #[error("output weight must be >= 0")]
    NegativeOutputWeight,
    /// `addToPool`/`takeFromPool`/`addToBuffer` received a negative delta.
    #[error("must add/subtract a non-negative number")]
    NegativeDelta,
    /// `setGateOutputWeight` referenced an edge not attached to this router.
    #[error("the output edge is not connected to this gate")]
    EdgeNotConnectedToGate,
    /// An operation targeted an element id whose kind does not match.
    #[error("Selected element is not a {0}")]
    WrongElementKind(&'static str),
    /// `Exchanger::swap` was invoked with a negative amount.
    #[error("cannot swap negative amount of token")]
    NegativeSwapAmount,
    /// An Exchanger was configured with a token not present among `{A, B}`.
    #[error("not all token names are defined")]
    UndefinedTokenNames,
    /// An Exchanger was configured with a non-positive amount.
    #[error("all tokens must have positive amount")]
    NonPositiveAmount,
    /// `setConverterRequiredInputPerUnit` received a non-positive amount where
    /// positive was required by the caller's intent (validation entrypoint).
    #[error("must have positive constraint")]
    NonPositiveConstraint,
    /// An Exchanger was configured with `tokenA == tokenB`.
    #[error("duplicate token types not allowed")]
    DuplicateTokenTypes,
    /// `getOrCreatePipe` was given an index that would leave a gap.
    #[error("swap index out of range")]
    SwapIndexOutOfRange,
    /// A label failed the `[A-Za-z_$][A-Za-z0-9_$]*` lexical check.
    #[error("label must follow javascript variable naming format")]
    InvalidLabelFormat,
    /// A token failed the `[A-Za-z_$][A-Za-z0-9_$]*` lexical check.
    #[error("token must follow javascript variable naming format")]
    InvalidTokenFormat,
    /// `setConverterRequiredInputPerUnit` named a token with no upstream producer.
    #[error("token {0} has no upstream producer")]
    UnreachableToken(String),
    /// `setReservoirAction`/`setCondition` passed a source string the
    /// evaluator could not compile.
    #[error("failed to compile expression: {0}")]
    ExpressionCompileFailed(String),
    /// `toJson`/`fromJson` failed to serialize or deserialize the graph.
    #[error("json error: {0}")]
    JsonError(String),
}

/// Convenience alias for fallible [`crate::graph::GraphModel`] operations.
pub type GraphResult<T> = Result<T, GraphError>;
