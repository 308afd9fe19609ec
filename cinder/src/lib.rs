use crate::main_loop::EngineLoop;
use cinder_core::cli::EngineArgs;

mod engine;
mod main_loop;
mod app;

pub use app::{App, RenderContext, RenderableApp};
pub use engine::Engine;

pub mod core {
    pub use cinder_core::*;
}
pub mod rhi {
    pub use cinder_rhi::*;
}
pub mod asset {
    pub use cinder_asset::*;
}
pub mod renderer {
    pub use cinder_renderer::*;
}

/// Launch main engine loop with specific App.
pub fn launch<A: RenderableApp>() -> Result<(), anyhow::Error> {
    let args = EngineArgs::parse_args();
    cinder_core::log::initialize(args.log_level.into())?;

    let app = A::new(&args)?;

    let main_loop = EngineLoop::new(app)?;
    main_loop.run()?;

    Ok(())
}
