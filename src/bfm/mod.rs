//! Bus functional model registry and call dispatch.
//!
//! A BFM is a host-side driver object paired with generated simulator-side
//! glue. Calls cross the boundary in both directions as
//! `(bfm_id, method_id, raw words)`:
//!
//! - **Exports** are implemented by the driver and called by the simulator.
//!   They arrive through the scheduler inbox and are routed by
//!   [`BfmRegistry::dispatch`].
//! - **Imports** are implemented by the simulator and called by the driver
//!   through [`BfmContext::call_import`], which packs the parameters and hands
//!   them to the [`BfmBackend`].
//!
//! # Example
//!
//! ```ignore
//! use cosync::bfm::{Bfm, BfmContext, BfmTypeBuilder, MethodDecl, ParamType};
//!
//! struct Uart { ctx: BfmContext, received: Vec<u8> }
//!
//! impl Bfm for Uart {
//!     fn describe(b: &mut BfmTypeBuilder<Self>) {
//!         b.import(MethodDecl::new("Uart.tx").param("byte", ParamType::U8))
//!          .export(MethodDecl::new("Uart.rx").param("byte", ParamType::U8), |u, args| {
//!              u.received.push(args[0].to()?);
//!              Ok(())
//!          });
//!     }
//!
//!     fn construct(ctx: BfmContext) -> cosync::Result<Self> {
//!         Ok(Self { ctx, received: Vec::new() })
//!     }
//! }
//! ```

pub mod backend;
pub mod param;
pub mod registry;
pub mod type_info;

pub use backend::{BfmBackend, BfmInstanceDesc};
pub use param::{pack, pack_all, unpack, unpack_all, MarshalError, ParamKind, ParamType, ParamValue};
pub use registry::{Bfm, BfmContext, BfmInfo, BfmRegistry, BfmTypeBuilder};
pub use type_info::{split_class_path, BfmTypeInfo, Direction, MethodDecl, MethodInfo, ParamInfo};
