//! Pattern query over names, attribute names and attribute values.

use async_trait::async_trait;
use tracing::debug;

use super::outcome::QueryOutcome;
use crate::worker::{AttributeRecord, JmxClient, JmxError, WorkerError, WorkerResult};

/// The three worker calls a query is built from.
#[async_trait]
pub trait MBeanSource: Send {
    /// Resolve a glob pattern into MBean names.
    async fn query_mbean_names(&mut self, pattern: &str) -> WorkerResult<Vec<String>>;

    /// Attribute names of one MBean.
    async fn get_mbean_attribute_names(&mut self, mbean_name: &str) -> WorkerResult<Vec<String>>;

    /// Attribute values of one MBean.
    async fn get_mbean_attributes(
        &mut self,
        mbean_name: &str,
        attributes: &[String],
    ) -> WorkerResult<Vec<AttributeRecord>>;
}

#[async_trait]
impl MBeanSource for JmxClient {
    async fn query_mbean_names(&mut self, pattern: &str) -> WorkerResult<Vec<String>> {
        JmxClient::query_mbean_names(self, pattern).await
    }

    async fn get_mbean_attribute_names(&mut self, mbean_name: &str) -> WorkerResult<Vec<String>> {
        JmxClient::get_mbean_attribute_names(self, mbean_name).await
    }

    async fn get_mbean_attributes(
        &mut self,
        mbean_name: &str,
        attributes: &[String],
    ) -> WorkerResult<Vec<AttributeRecord>> {
        JmxClient::get_mbean_attributes(self, mbean_name, attributes).await
    }
}

/// Read every attribute of every MBean matching `pattern`.
///
/// A failed name lookup fails the query. A JMX error on one MBean or one
/// attribute becomes an error entry and the query moves on; any other error
/// means the worker is unusable and fails the query.
pub async fn query_mbean<S>(source: &mut S, pattern: &str) -> WorkerResult<QueryOutcome>
where
    S: MBeanSource + ?Sized,
{
    let mut outcome = QueryOutcome::new();
    let mbean_names = source.query_mbean_names(pattern).await?;

    for mbean_name in &mbean_names {
        let attribute_names = match source.get_mbean_attribute_names(mbean_name).await {
            Ok(names) => names,
            Err(WorkerError::Jmx(e)) => {
                debug!(mbean = %mbean_name, error = %e, "skipping mbean");
                outcome.push_error(mbean_error(mbean_name, &e));
                continue;
            }
            Err(e) => return Err(e),
        };

        for attribute_name in attribute_names {
            let attributes = std::slice::from_ref(&attribute_name);
            match source.get_mbean_attributes(mbean_name, attributes).await {
                Ok(records) => records.into_iter().for_each(|r| outcome.push_success(r)),
                Err(WorkerError::Jmx(e)) => {
                    debug!(
                        mbean = %mbean_name,
                        attribute = %attribute_name,
                        error = %e,
                        "skipping attribute"
                    );
                    outcome.push_error(attribute_error(mbean_name, &attribute_name, &e));
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(outcome)
}

fn mbean_error(mbean_name: &str, err: &JmxError) -> String {
    format!(
        "error while querying mBean name: '{}', error message: {}, error cause: {}, stacktrace: {:?}",
        mbean_name, err.message, err.cause_message, err.stacktrace
    )
}

fn attribute_error(mbean_name: &str, attribute: &str, err: &JmxError) -> String {
    format!(
        "error while querying mBean '{}', attribute: '{}', error message: {}, error cause: {}, stacktrace: {:?}",
        mbean_name, attribute, err.message, err.cause_message, err.stacktrace
    )
}
