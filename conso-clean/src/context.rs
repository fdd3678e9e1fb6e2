//! DataFusion session management for the cleaning stage.
//!
//! [`CleaningContext`] wraps DataFusion's [`SessionContext`], registers the
//! row-level normalizers, and tracks in-memory tables materialized with
//! [`CleaningContext::cache`] so they are released on every exit path.

use crate::config::EngineConfig;
use crate::prelude::*;
use crate::udf;
use datafusion::dataframe::DataFrame;
use datafusion::datasource::TableProvider;
use datafusion::execution::context::{SessionConfig, SessionContext};
use datafusion::execution::memory_pool::{FairSpillPool, MemoryPool};
use datafusion::execution::runtime_env::RuntimeEnvBuilder;
use datafusion::execution::FunctionRegistry;
use datafusion::logical_expr::ScalarUDF;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// A managed DataFusion session for one run of the stage.
///
/// # Examples
///
/// ```rust,no_run
/// use conso_clean::config::EngineConfig;
/// use conso_clean::context::CleaningContext;
///
/// # async fn example() -> conso_clean::error::Result<()> {
/// let mut ctx = CleaningContext::new(&EngineConfig::default())?;
/// let df = ctx.inner().sql("SELECT 1 AS one").await?;
/// let cached = ctx.cache("one", df).await?;
/// assert_eq!(cached.count().await?, 1);
/// ctx.release("one")?;
/// # Ok(())
/// # }
/// ```
pub struct CleaningContext {
    inner: SessionContext,
    cached: HashMap<String, Arc<dyn TableProvider>>,
}

impl CleaningContext {
    /// Creates the session and registers the normalizer UDFs.
    #[instrument(skip(config), fields(
        engine.batch_size = config.batch_size,
        engine.target_partitions = config.target_partitions
    ))]
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let session_config = SessionConfig::new()
            .with_batch_size(config.batch_size)
            .with_target_partitions(config.target_partitions)
            .with_information_schema(true);

        let pool_size = (config.max_memory as f64 * config.memory_fraction) as usize;
        let memory_pool = Arc::new(FairSpillPool::new(pool_size)) as Arc<dyn MemoryPool>;

        let runtime_env = RuntimeEnvBuilder::new()
            .with_memory_pool(memory_pool)
            .with_temp_file_path(std::env::temp_dir())
            .build()
            .map(Arc::new)?;

        let inner = SessionContext::new_with_config_rt(session_config, runtime_env);
        for function in udf::all() {
            debug!(udf.name = %function.name(), "Registering scalar UDF");
            inner.register_udf(function);
        }

        info!(
            engine.batch_size = config.batch_size,
            engine.target_partitions = config.target_partitions,
            engine.memory_pool_bytes = pool_size,
            "DataFusion session created"
        );

        Ok(Self {
            inner,
            cached: HashMap::new(),
        })
    }

    /// Returns a reference to the underlying [`SessionContext`].
    pub fn inner(&self) -> &SessionContext {
        &self.inner
    }

    /// Looks up a registered UDF by name.
    pub fn udf(&self, name: &str) -> Result<Arc<ScalarUDF>> {
        Ok(self.inner.udf(name)?)
    }

    /// Returns the names of all cached tables.
    pub fn cached_tables(&self) -> Vec<&str> {
        self.cached.keys().map(|s| s.as_str()).collect()
    }

    /// Checks if a table is cached.
    pub fn is_cached(&self, name: &str) -> bool {
        self.cached.contains_key(name)
    }

    /// Materializes `frame` into memory, registers it as `name`, and returns
    /// a frame that reads from the cached copy.
    #[instrument(skip(self, frame))]
    pub async fn cache(&mut self, name: &str, frame: DataFrame) -> Result<DataFrame> {
        if self.is_cached(name) {
            self.release(name)?;
        }
        let cached = frame.cache().await?;
        let provider = cached.clone().into_view();
        self.inner.register_table(name, provider.clone())?;
        self.cached.insert(name.to_string(), provider);
        debug!(table.name = %name, "Cached relation");
        Ok(self.inner.table(name).await?)
    }

    /// Releases one cached table.
    pub fn release(&mut self, name: &str) -> Result<()> {
        self.inner.deregister_table(name)?;
        self.cached.remove(name);
        debug!(table.name = %name, "Released cached relation");
        Ok(())
    }

    /// Releases every cached table, attempting all of them even if one fails.
    ///
    /// Returns the number of tables that could not be released.
    pub fn release_all(&mut self) -> usize {
        let names: Vec<_> = self.cached.keys().cloned().collect();
        let mut failures = 0;
        for name in names {
            match self.release(&name) {
                Ok(()) => info!(table.name = %name, "[ok]: cache released"),
                Err(e) => {
                    failures += 1;
                    self.cached.remove(&name);
                    error!(table.name = %name, error = %e, "[ko]: failed to release cache");
                }
            }
        }
        failures
    }
}

/// Cached tables are released when the context goes out of scope, whether
/// the run succeeded or failed.
impl Drop for CleaningContext {
    fn drop(&mut self) {
        if !self.cached.is_empty() {
            self.release_all();
        }
    }
}
