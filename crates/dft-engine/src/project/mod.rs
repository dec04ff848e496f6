//! Project loading: `dft_project.yml` plus every pipeline declaration
//! under `pipelines/`.

mod loader;

pub use loader::{load_project, Project};
