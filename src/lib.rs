//! # filtercrate
//!
//! Compiles untrusted JSON filters into parameterized SQL WHERE fragments for
//! Axum and Sea-ORM backends.
//!
//! ```rust,ignore
//! use filtercrate::{FilterQuery, RenderOptions, compile};
//!
//! async fn list_members(
//!     State(db): State<DatabaseConnection>,
//!     Query(query): Query<FilterQuery>,
//! ) -> Result<Json<Vec<Member>>, ApiError> {
//!     let condition = compile(&MEMBER_FILTERS, &query.parse()?)?;
//!     let statement = condition
//!         .render(&RenderOptions::new(db.get_database_backend(), "members"))?
//!         .into_statement(r#"SELECT * FROM "members""#);
//!     let members = Member::find_by_statement(statement).all(&db).await?;
//!     Ok(Json(members))
//! }
//! ```

pub mod config;
pub mod errors;
pub mod filtering;
pub mod models;
pub mod sql;

pub use config::CompilerOptions;
pub use errors::{DefinitionError, FilterError, RenderError};
pub use filtering::{
    ColumnDescriptor, FilterCompiler, FilterDefinitions, NormalizedValue, SqlValueType, compile,
    compile_with,
};
pub use models::FilterQuery;
pub use sql::{ColumnRef, Condition, Expression, Join, RenderOptions, SqlQuery, SubSelect};
