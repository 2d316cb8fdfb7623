//! High-level client API.

use crate::commands;
use crate::connection::{ClientConfig, Connection};
use crate::error::ClientError;
use crate::record::Record;
use aerolite_protocol::digest::{hash_key, DIGEST_SIZE};
use aerolite_protocol::message::Operation;
use aerolite_protocol::particle::ParticleValue;
use aerolite_protocol::policy::RetryPolicy;
use std::collections::HashMap;
use tokio::net::TcpStream;

/// Asynchronous client for one node.
///
/// Wraps a single [`Connection`] and the config it was opened with. One
/// request is in flight at a time; clone the config and connect again for
/// parallelism.
pub struct Client {
    conn: Connection<TcpStream>,
    config: ClientConfig,
}

impl Client {
    /// Connects to the node named in `config`.
    pub async fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let conn = Connection::connect(&config).await?;
        Ok(Self { conn, config })
    }

    /// Queries text info keys, returning a name/value map.
    pub async fn info<N: AsRef<str>>(
        &mut self,
        names: &[N],
    ) -> Result<HashMap<String, String>, ClientError> {
        self.conn.request_info(names).await
    }

    /// Fetches a record; an empty `bins` list means all bins.
    pub async fn get(
        &mut self,
        namespace: &str,
        set: &str,
        key: &str,
        bins: &[&str],
    ) -> Result<Record, ClientError> {
        let request = commands::read_command(namespace, set, key, bins);
        let message = self.conn.execute(&request, &self.config.policy).await?;
        Ok(message.into())
    }

    /// True when the record exists; no bin data crosses the wire.
    pub async fn exists(
        &mut self,
        namespace: &str,
        set: &str,
        key: &str,
    ) -> Result<bool, ClientError> {
        let request = commands::exists_command(namespace, set, key);
        match self.conn.execute(&request, &self.config.policy).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Writes bins. A `record_ttl` of zero keeps the namespace default.
    pub async fn put(
        &mut self,
        namespace: &str,
        set: &str,
        key: &str,
        bins: &[(&str, ParticleValue)],
        record_ttl: u32,
    ) -> Result<(), ClientError> {
        let request = commands::write_command(namespace, set, key, bins, record_ttl);
        self.conn.execute(&request, &self.config.policy).await?;
        Ok(())
    }

    /// Deletes a record; false when it was not there.
    pub async fn delete(
        &mut self,
        namespace: &str,
        set: &str,
        key: &str,
    ) -> Result<bool, ClientError> {
        let request = commands::delete_command(namespace, set, key);
        match self.conn.execute(&request, &self.config.policy).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Adds `delta` to an integer bin, creating record and bin as needed.
    pub async fn incr(
        &mut self,
        namespace: &str,
        set: &str,
        key: &str,
        bin: &str,
        delta: i64,
    ) -> Result<(), ClientError> {
        let policy = self.config.operate_policy.clone();
        self.operate(namespace, set, key, vec![Operation::incr(bin, delta)], &policy)
            .await?;
        Ok(())
    }

    /// Appends to a string or blob bin.
    pub async fn append(
        &mut self,
        namespace: &str,
        set: &str,
        key: &str,
        bin: &str,
        value: ParticleValue,
    ) -> Result<(), ClientError> {
        let policy = self.config.operate_policy.clone();
        self.operate(
            namespace,
            set,
            key,
            vec![Operation::append(bin, &value)],
            &policy,
        )
        .await?;
        Ok(())
    }

    /// Prepends to a string or blob bin.
    pub async fn prepend(
        &mut self,
        namespace: &str,
        set: &str,
        key: &str,
        bin: &str,
        value: ParticleValue,
    ) -> Result<(), ClientError> {
        let policy = self.config.operate_policy.clone();
        self.operate(
            namespace,
            set,
            key,
            vec![Operation::prepend(bin, &value)],
            &policy,
        )
        .await?;
        Ok(())
    }

    /// Refreshes the record TTL without touching any bin.
    pub async fn touch(
        &mut self,
        namespace: &str,
        set: &str,
        key: &str,
    ) -> Result<(), ClientError> {
        let policy = self.config.operate_policy.clone();
        self.operate(namespace, set, key, vec![Operation::touch()], &policy)
            .await?;
        Ok(())
    }

    /// Applies explicit operations under an explicit retry policy: the
    /// escape hatch behind the modify verbs above.
    pub async fn operate(
        &mut self,
        namespace: &str,
        set: &str,
        key: &str,
        ops: Vec<Operation>,
        policy: &RetryPolicy,
    ) -> Result<Record, ClientError> {
        let request = commands::operate_command(namespace, set, key, ops);
        let message = self.conn.execute(&request, policy).await?;
        Ok(message.into())
    }

    /// Batch-fetches whole records by key. Records come back in server
    /// reply order; missing keys yield records with `found` unset.
    pub async fn get_many(
        &mut self,
        namespace: &str,
        set: &str,
        keys: &[&str],
    ) -> Result<Vec<Record>, ClientError> {
        let digests: Vec<[u8; DIGEST_SIZE]> =
            keys.iter().map(|key| hash_key(set, key)).collect();
        let request = commands::batch_read_command(namespace, &digests);
        let messages = self.conn.execute_batch(&request, &self.config.policy).await?;
        Ok(messages.into_iter().map(Record::from).collect())
    }

    /// Hands back the underlying connection for protocol-level use.
    pub fn connection(&mut self) -> &mut Connection<TcpStream> {
        &mut self.conn
    }
}
