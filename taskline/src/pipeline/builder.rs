//! Typed pipeline builder.
//!
//! The builder is a heterogeneous composition whose well-formedness is a
//! static property: `then` on a `Pipeline<In, Mid>` only accepts a body
//! consuming `Mid`, so two adjacent stages with disagreeing carried-value
//! types are rejected by the compiler rather than at execution time.
//! Internally stages are erased over `Box<dyn Any + Send>`; the downcast on
//! the erased path is unreachable through this API.

use crate::context::StageHandle;
use futures::future::BoxFuture;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

/// The type-erased value threaded between stages.
pub(crate) type CarriedValue = Box<dyn Any + Send>;

/// Error produced by an erased stage body.
pub(crate) enum ErasedStageError {
    /// The body itself returned an error.
    Body(anyhow::Error),
    /// The carried value did not match the stage's input type. Unreachable
    /// through the typed API; kept as a guard on the erased path.
    Type {
        /// The input type the stage expected.
        expected: &'static str,
    },
}

type ErasedBody = Box<
    dyn FnOnce(Arc<StageHandle>, CarriedValue) -> BoxFuture<'static, Result<CarriedValue, ErasedStageError>>
        + Send,
>;

/// One ordered, type-erased entry in the chain.
pub(crate) struct ErasedStage {
    pub(crate) name: String,
    pub(crate) body: ErasedBody,
}

impl std::fmt::Debug for ErasedStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErasedStage")
            .field("name", &self.name)
            .finish()
    }
}

/// An ordered chain of stages from a seed of type `In` to a result of type
/// `Out`.
///
/// Each stage consumes the previous stage's output and produces the next
/// stage's input; the carried value is exclusively owned by the pipeline
/// between stages. A pipeline executes at most once -
/// [`execute`](Self::execute) consumes it.
///
/// ```rust
/// use taskline::{CancellationToken, Pipeline};
///
/// # tokio_test::block_on(async {
/// let pipeline = Pipeline::<i32>::begin()
///     .then("int to string", |_handle, n| async move {
///         anyhow::Ok(n.to_string())
///     })
///     .then("parse and divide by 4", |_handle, s: String| async move {
///         let n: i32 = s.parse()?;
///         anyhow::Ok(n / 4)
///     });
///
/// let parent = CancellationToken::new();
/// let result = pipeline.execute(&parent, 12).await.unwrap();
/// assert_eq!(result, 3);
/// # });
/// ```
///
/// A chain whose adjacent types disagree does not compile:
///
/// ```rust,compile_fail
/// use taskline::Pipeline;
///
/// // The first stage produces a String but the second consumes an i32.
/// let pipeline = Pipeline::<i32>::begin()
///     .then("int to string", |_handle, n: i32| async move {
///         anyhow::Ok(n.to_string())
///     })
///     .then("divide by 4", |_handle, n: i32| async move {
///         anyhow::Ok(n / 4)
///     });
/// ```
pub struct Pipeline<In, Out = In> {
    pub(crate) stages: Vec<ErasedStage>,
    _chain: PhantomData<fn(In) -> Out>,
}

impl<In> Pipeline<In, In>
where
    In: Send + 'static,
{
    /// Begins an empty pipeline whose seed type is `In`.
    #[must_use]
    pub fn begin() -> Self {
        Self {
            stages: Vec::new(),
            _chain: PhantomData,
        }
    }
}

impl<In, Out> Pipeline<In, Out>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    /// Appends a stage consuming the current output type.
    ///
    /// The name is used only for diagnostics: tracing fields, failure
    /// attribution in [`ExecuteError`](crate::ExecuteError).
    #[must_use]
    pub fn then<Next, F, Fut>(mut self, name: impl Into<String>, body: F) -> Pipeline<In, Next>
    where
        Next: Send + 'static,
        F: FnOnce(Arc<StageHandle>, Out) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Next>> + Send + 'static,
    {
        let erased: ErasedBody = Box::new(move |handle, carried| {
            Box::pin(async move {
                let input = carried.downcast::<Out>().map_err(|_| ErasedStageError::Type {
                    expected: std::any::type_name::<Out>(),
                })?;
                let output = body(handle, *input).await.map_err(ErasedStageError::Body)?;
                Ok(Box::new(output) as CarriedValue)
            })
        });

        self.stages.push(ErasedStage {
            name: name.into(),
            body: erased,
        });

        Pipeline {
            stages: self.stages,
            _chain: PhantomData,
        }
    }

    /// Returns the number of registered stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns whether the pipeline has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Returns the registered stage names, in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }
}

impl<In, Out> std::fmt::Debug for Pipeline<In, Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stages)
            .finish()
    }
}
