//! Blocking mirror of the async client, for callers that do their own
//! threading.
//!
//! The codecs, command builders, retry machinery and record mapping are
//! all shared with the async side; only the byte moving differs. The
//! method surface matches [`crate::Client`] one for one.

use crate::commands;
use crate::connection::{ClientConfig, MAX_RESPONSE_SIZE};
use crate::error::ClientError;
use crate::record::Record;
use crate::resync::read_exact_or_resync_blocking;
use aerolite_protocol::digest::{hash_key, DIGEST_SIZE};
use aerolite_protocol::frame::{pack_frame, FrameHeader, MessageType, FRAME_HEADER_SIZE};
use aerolite_protocol::info::{pack_info_request, parse_info_response};
use aerolite_protocol::message::{Operation, RecordMessage};
use aerolite_protocol::particle::ParticleValue;
use aerolite_protocol::policy::{ExchangeState, RetryPolicy};
use aerolite_protocol::ProtocolError;
use bytes::Bytes;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::TcpStream;

/// A single-owner blocking connection to one node.
pub struct Connection<S> {
    stream: S,
    needs_resync: bool,
}

impl Connection<TcpStream> {
    /// Connects a TCP transport within the configured timeout.
    pub fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        tracing::debug!("connecting to {}", config.addr);
        let stream = TcpStream::connect_timeout(&config.addr, config.connect_timeout)?;
        stream.set_nodelay(true).ok();
        Ok(Self::from_stream(stream))
    }
}

impl<S> Connection<S>
where
    S: Read + Write,
{
    /// Wraps an established byte stream.
    pub fn from_stream(stream: S) -> Self {
        Self {
            stream,
            needs_resync: false,
        }
    }

    pub fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    /// Blocking twin of [`crate::Connection::execute`].
    pub fn execute(
        &mut self,
        request: &RecordMessage,
        policy: &RetryPolicy,
    ) -> Result<RecordMessage, ClientError> {
        let frame = pack_frame(MessageType::Message, &request.encode()?)?;
        let mut state = policy.begin();
        loop {
            self.stream.write_all(&frame)?;
            let mut payload = self.read_frame()?;
            let message = match RecordMessage::decode(&mut payload) {
                Ok(message) => message,
                Err(err) => {
                    self.needs_resync = true;
                    return Err(err.into());
                }
            };

            let code = message.header.result_code;
            if !code.is_ok() {
                self.needs_resync = true;
            }

            state = state.observe(code, policy);
            match state {
                ExchangeState::Succeeded => return Ok(message),
                ExchangeState::Failed(code) => return Err(ClientError::Server(code)),
                ExchangeState::Attempting { remaining } => {
                    tracing::debug!("server answered {}, {} attempts left", code, remaining);
                }
            }
        }
    }

    /// Blocking twin of [`crate::Connection::execute_batch`].
    pub fn execute_batch(
        &mut self,
        request: &RecordMessage,
        policy: &RetryPolicy,
    ) -> Result<Vec<RecordMessage>, ClientError> {
        let frame = pack_frame(MessageType::Message, &request.encode()?)?;
        let mut state = policy.begin();
        loop {
            self.stream.write_all(&frame)?;
            match self.read_batch_replies() {
                Ok(records) => return Ok(records),
                Err(ClientError::Server(code)) => {
                    state = state.observe(code, policy);
                    match state {
                        ExchangeState::Failed(code) => return Err(ClientError::Server(code)),
                        ExchangeState::Attempting { remaining } => {
                            tracing::debug!(
                                "batch answered {}, {} attempts left",
                                code,
                                remaining
                            );
                        }
                        // abort codes are never OK
                        ExchangeState::Succeeded => unreachable!(),
                    }
                }
                Err(other) => return Err(other),
            }
        }
    }

    fn read_batch_replies(&mut self) -> Result<Vec<RecordMessage>, ClientError> {
        let mut records = Vec::new();
        loop {
            let mut payload = self.read_frame()?;
            while !payload.is_empty() {
                let message = match RecordMessage::decode(&mut payload) {
                    Ok(message) => message,
                    Err(err) => {
                        self.needs_resync = true;
                        return Err(err.into());
                    }
                };

                let code = message.header.result_code;
                if !code.is_ok() && !code.is_not_found() {
                    self.needs_resync = true;
                    return Err(ClientError::Server(code));
                }

                let last = message.header.is_last();
                records.push(message);
                if last {
                    return Ok(records);
                }
            }
        }
    }

    /// Sends one info request and parses the text reply.
    pub fn request_info<N: AsRef<str>>(
        &mut self,
        names: &[N],
    ) -> Result<HashMap<String, String>, ClientError> {
        let frame = pack_frame(MessageType::Info, &pack_info_request(names))?;
        self.stream.write_all(&frame)?;
        let payload = self.read_frame()?;
        let text = std::str::from_utf8(&payload).map_err(|_| ProtocolError::InvalidUtf8)?;
        Ok(parse_info_response(text))
    }

    fn read_frame(&mut self) -> Result<Bytes, ClientError> {
        let resync = std::mem::take(&mut self.needs_resync);
        let head = read_exact_or_resync_blocking(&mut self.stream, FRAME_HEADER_SIZE, resync)?;

        let header = match FrameHeader::decode(&head) {
            Ok(header) => header,
            Err(err) => {
                self.needs_resync = true;
                return Err(err.into());
            }
        };
        if header.size > MAX_RESPONSE_SIZE {
            self.needs_resync = true;
            return Err(ClientError::Protocol(ProtocolError::FrameTooLarge {
                size: header.size,
                max: MAX_RESPONSE_SIZE,
            }));
        }

        let mut payload = vec![0u8; header.size as usize];
        self.stream.read_exact(&mut payload)?;
        Ok(Bytes::from(payload))
    }
}

/// Blocking counterpart of [`crate::Client`].
pub struct Client {
    conn: Connection<TcpStream>,
    config: ClientConfig,
}

impl Client {
    /// Connects to the node named in `config`.
    pub fn connect(config: ClientConfig) -> Result<Self, ClientError> {
        let conn = Connection::connect(&config)?;
        Ok(Self { conn, config })
    }

    /// Queries text info keys, returning a name/value map.
    pub fn info<N: AsRef<str>>(&mut self, names: &[N]) -> Result<HashMap<String, String>, ClientError> {
        self.conn.request_info(names)
    }

    /// Fetches a record; an empty `bins` list means all bins.
    pub fn get(
        &mut self,
        namespace: &str,
        set: &str,
        key: &str,
        bins: &[&str],
    ) -> Result<Record, ClientError> {
        let request = commands::read_command(namespace, set, key, bins);
        let message = self.conn.execute(&request, &self.config.policy)?;
        Ok(message.into())
    }

    /// True when the record exists; no bin data crosses the wire.
    pub fn exists(&mut self, namespace: &str, set: &str, key: &str) -> Result<bool, ClientError> {
        let request = commands::exists_command(namespace, set, key);
        match self.conn.execute(&request, &self.config.policy) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Writes bins. A `record_ttl` of zero keeps the namespace default.
    pub fn put(
        &mut self,
        namespace: &str,
        set: &str,
        key: &str,
        bins: &[(&str, ParticleValue)],
        record_ttl: u32,
    ) -> Result<(), ClientError> {
        let request = commands::write_command(namespace, set, key, bins, record_ttl);
        self.conn.execute(&request, &self.config.policy)?;
        Ok(())
    }

    /// Deletes a record; false when it was not there.
    pub fn delete(&mut self, namespace: &str, set: &str, key: &str) -> Result<bool, ClientError> {
        let request = commands::delete_command(namespace, set, key);
        match self.conn.execute(&request, &self.config.policy) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Adds `delta` to an integer bin, creating record and bin as needed.
    pub fn incr(
        &mut self,
        namespace: &str,
        set: &str,
        key: &str,
        bin: &str,
        delta: i64,
    ) -> Result<(), ClientError> {
        let policy = self.config.operate_policy.clone();
        self.operate(namespace, set, key, vec![Operation::incr(bin, delta)], &policy)?;
        Ok(())
    }

    /// Appends to a string or blob bin.
    pub fn append(
        &mut self,
        namespace: &str,
        set: &str,
        key: &str,
        bin: &str,
        value: ParticleValue,
    ) -> Result<(), ClientError> {
        let policy = self.config.operate_policy.clone();
        self.operate(namespace, set, key, vec![Operation::append(bin, &value)], &policy)?;
        Ok(())
    }

    /// Prepends to a string or blob bin.
    pub fn prepend(
        &mut self,
        namespace: &str,
        set: &str,
        key: &str,
        bin: &str,
        value: ParticleValue,
    ) -> Result<(), ClientError> {
        let policy = self.config.operate_policy.clone();
        self.operate(namespace, set, key, vec![Operation::prepend(bin, &value)], &policy)?;
        Ok(())
    }

    /// Refreshes the record TTL without touching any bin.
    pub fn touch(&mut self, namespace: &str, set: &str, key: &str) -> Result<(), ClientError> {
        let policy = self.config.operate_policy.clone();
        self.operate(namespace, set, key, vec![Operation::touch()], &policy)?;
        Ok(())
    }

    /// Applies explicit operations under an explicit retry policy.
    pub fn operate(
        &mut self,
        namespace: &str,
        set: &str,
        key: &str,
        ops: Vec<Operation>,
        policy: &RetryPolicy,
    ) -> Result<Record, ClientError> {
        let request = commands::operate_command(namespace, set, key, ops);
        let message = self.conn.execute(&request, policy)?;
        Ok(message.into())
    }

    /// Batch-fetches whole records by key, in server reply order.
    pub fn get_many(
        &mut self,
        namespace: &str,
        set: &str,
        keys: &[&str],
    ) -> Result<Vec<Record>, ClientError> {
        let digests: Vec<[u8; DIGEST_SIZE]> =
            keys.iter().map(|key| hash_key(set, key)).collect();
        let request = commands::batch_read_command(namespace, &digests);
        let messages = self.conn.execute_batch(&request, &self.config.policy)?;
        Ok(messages.into_iter().map(Record::from).collect())
    }

    /// Hands back the underlying connection for protocol-level use.
    pub fn connection(&mut self) -> &mut Connection<TcpStream> {
        &mut self.conn
    }
}
