//! # Operators
//!
//! Processors that sit between a source and a terminal stage.
//!
//! | Module | Operators |
//! |--------|-----------|
//! | `stage` + `transform` | map, filter, take-while, drop-while, distinct |
//! | `stage` + `limit` | limit, skip |
//! | `peek` | side-effect hooks |
//! | `resume` | error recovery |
//! | `concat_map` | sequential flat-map |
//! | `flat_map` | bounded-concurrency flat-map |
//! | `via` | lazy processor wiring |
//! | `deferred` | identity processor with deferred upstream |
//! | `coupled` | subscriber and publisher with shared termination |
//! | `multicast` | one upstream fanned out in lockstep |

use flowline_types::{FlowResult, Publisher};
use std::sync::Arc;

mod concat_map;
mod coupled;
mod deferred;
mod flat_map;
mod limit;
mod multicast;
mod peek;
mod resume;
mod stage;
mod transform;
mod via;

/// Maps an outer item to the inner publisher flattened in its place.
pub(crate) type InnerMapper<T, R> =
    Arc<dyn Fn(T) -> FlowResult<Arc<dyn Publisher<R>>> + Send + Sync>;

pub(crate) use concat_map::ConcatMapPublisher;
pub use coupled::CoupledProcessor;
pub use deferred::DeferredProcessor;
pub(crate) use flat_map::FlatMapPublisher;
pub(crate) use limit::{LimitLogic, SkipLogic};
pub use multicast::MulticastProcessor;
pub(crate) use peek::{Hooks, PeekPublisher};
pub(crate) use resume::{FallbackFn, ResumePublisher};
pub(crate) use stage::StagePublisher;
pub(crate) use transform::{
    DistinctLogic, DropWhileLogic, FilterLogic, MapFn, MapLogic, PredicateFn, TakeWhileLogic,
};
pub(crate) use via::ViaPublisher;
