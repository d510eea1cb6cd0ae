//! Built-in project strategies.
//!
//! | Strategy | Name | Priority | Recognizes |
//! |----------|------|----------|------------|
//! | [`DockerfileStrategy`] | `Standard Dockerfile` | 0 | `Dockerfile` |
//! | [`TemplateStrategy`] | `Dockerfile.template` | 2 | `Dockerfile.template` |
//! | [`ArchDockerfileStrategy`] | `Architecture-specific Dockerfile` | 3 | `Dockerfile.<arch>`, `Dockerfile.<device>` |
//! | [`NodeStrategy`] | `NodeJS` | 0 | root `package.json` |

pub mod arch;
pub mod dockerfile;
pub mod node;
pub mod template;

pub use arch::ArchDockerfileStrategy;
pub use dockerfile::DockerfileStrategy;
pub use node::NodeStrategy;
pub use template::TemplateStrategy;
