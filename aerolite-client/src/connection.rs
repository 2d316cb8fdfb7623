//! Connection management and the message exchange engine.

use crate::error::ClientError;
use crate::resync::read_exact_or_resync;
use aerolite_protocol::frame::{pack_frame, FrameHeader, MessageType, FRAME_HEADER_SIZE};
use aerolite_protocol::info::{pack_info_request, parse_info_response};
use aerolite_protocol::message::RecordMessage;
use aerolite_protocol::policy::{ExchangeState, RetryPolicy};
use aerolite_protocol::ProtocolError;
use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Largest reply payload the client will buffer. A declared size past
/// this is treated as a framing fault, not an allocation request.
pub const MAX_RESPONSE_SIZE: u64 = 128 * 1024 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Node address.
    pub addr: SocketAddr,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Retry policy for reads, writes, deletes and batches.
    pub policy: RetryPolicy,
    /// Retry policy for incr/append/prepend/touch, which create missing
    /// records and so also retry a transient not-found.
    pub operate_policy: RetryPolicy,
}

impl ClientConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            connect_timeout: Duration::from_secs(10),
            policy: RetryPolicy::new(),
            operate_policy: RetryPolicy::modify(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_operate_policy(mut self, policy: RetryPolicy) -> Self {
        self.operate_policy = policy;
        self
    }
}

/// A single-owner connection to one node.
///
/// The protocol is strictly one exchange at a time per connection, which
/// the `&mut self` receivers turn into a compile-time rule. Callers that
/// want concurrency open more connections.
pub struct Connection<S> {
    stream: S,
    /// Armed after result-code and decode errors; the next read hunts for
    /// the frame-start sentinel instead of trusting alignment.
    needs_resync: bool,
}

impl Connection<TcpStream> {
    /// Connects a TCP transport within the configured timeout.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        tracing::debug!("connecting to {}", config.addr);
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(config.addr))
            .await
            .map_err(|_| {
                tracing::debug!("connect timed out");
                ClientError::Timeout
            })??;
        stream.set_nodelay(true).ok();
        Ok(Self::from_stream(stream))
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an established byte stream.
    pub fn from_stream(stream: S) -> Self {
        Self {
            stream,
            needs_resync: false,
        }
    }

    /// True when the next read will resynchronize before trusting frame
    /// alignment.
    pub fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    /// Runs one request/response exchange for a single record message,
    /// re-sending the identical request while the node answers with a
    /// result code the policy retries.
    pub async fn execute(
        &mut self,
        request: &RecordMessage,
        policy: &RetryPolicy,
    ) -> Result<RecordMessage, ClientError> {
        let frame = pack_frame(MessageType::Message, &request.encode()?)?;
        let mut state = policy.begin();
        loop {
            self.stream.write_all(&frame).await?;
            let mut payload = self.read_frame().await?;
            let message = match RecordMessage::decode(&mut payload) {
                Ok(message) => message,
                Err(err) => {
                    self.needs_resync = true;
                    return Err(err.into());
                }
            };

            let code = message.header.result_code;
            if !code.is_ok() {
                // error replies can leave the stream a byte off
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

    /// Runs a streaming batch exchange: one request, then reply frames
    /// until a record message arrives with the last-message bit set.
    ///
    /// Per-record result codes 0 and 2 both contribute a record (2 is the
    /// soft not-found); any other code aborts the batch. A retryable abort
    /// discards the partial reply and re-sends the whole request.
    pub async fn execute_batch(
        &mut self,
        request: &RecordMessage,
        policy: &RetryPolicy,
    ) -> Result<Vec<RecordMessage>, ClientError> {
        let frame = pack_frame(MessageType::Message, &request.encode()?)?;
        let mut state = policy.begin();
        loop {
            self.stream.write_all(&frame).await?;
            match self.read_batch_replies().await {
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

    async fn read_batch_replies(&mut self) -> Result<Vec<RecordMessage>, ClientError> {
        let mut records = Vec::new();
        loop {
            let mut payload = self.read_frame().await?;
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
                    tracing::debug!("batch complete, {} records", records.len());
                    return Ok(records);
                }
            }
        }
    }

    /// Sends one info request and parses the text reply.
    pub async fn request_info<N: AsRef<str>>(
        &mut self,
        names: &[N],
    ) -> Result<HashMap<String, String>, ClientError> {
        let frame = pack_frame(MessageType::Info, &pack_info_request(names))?;
        self.stream.write_all(&frame).await?;
        let payload = self.read_frame().await?;
        let text = std::str::from_utf8(&payload).map_err(|_| ProtocolError::InvalidUtf8)?;
        Ok(parse_info_response(text))
    }

    /// Reads one framed payload: 8 header bytes (resynchronizing first if
    /// armed), then exactly the declared size.
    async fn read_frame(&mut self) -> Result<Bytes, ClientError> {
        let resync = std::mem::take(&mut self.needs_resync);
        let head = read_exact_or_resync(&mut self.stream, FRAME_HEADER_SIZE, resync).await?;

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
        self.stream.read_exact(&mut payload).await?;
        Ok(Bytes::from(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aerolite_protocol::message::{Field, Operation, INFO1_GET_ALL, INFO1_READ, INFO3_LAST};
    use aerolite_protocol::particle::ParticleValue;
    use aerolite_protocol::ResultCode;

    fn read_request() -> RecordMessage {
        RecordMessage::new(INFO1_READ | INFO1_GET_ALL, 0, 0)
            .with_field(Field::namespace("test"))
            .with_field(Field::set_name("demo"))
            .with_field(Field::key("k1"))
    }

    fn request_frame(request: &RecordMessage) -> Vec<u8> {
        pack_frame(MessageType::Message, &request.encode().unwrap())
            .unwrap()
            .to_vec()
    }

    fn reply_frame(code: ResultCode, info3: u8, ops: Vec<Operation>) -> Vec<u8> {
        let mut reply = RecordMessage::new(0, 0, info3).with_ops(ops);
        reply.header.result_code = code;
        pack_frame(MessageType::Message, &reply.encode_reply().unwrap())
            .unwrap()
            .to_vec()
    }

    #[test]
    fn test_config_defaults() {
        let config = ClientConfig::new("127.0.0.1:3000".parse().unwrap());
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.policy.attempts(), 3);
        assert!(config.policy.is_retryable(ResultCode::CLUSTER_KEY_MISMATCH));
        assert!(config.operate_policy.is_retryable(ResultCode::KEY_NOT_FOUND));
    }

    #[test]
    fn test_config_builders() {
        let config = ClientConfig::new("127.0.0.1:3000".parse().unwrap())
            .with_connect_timeout(Duration::from_secs(2))
            .with_policy(RetryPolicy::new().without_retries());
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert!(!config.policy.is_retryable(ResultCode::CLUSTER_KEY_MISMATCH));
    }

    #[tokio::test]
    async fn test_execute_returns_decoded_reply() {
        let request = read_request();
        let reply = reply_frame(
            ResultCode::OK,
            0,
            vec![Operation::write("name", &ParticleValue::from("ada"))],
        );
        let mock = tokio_test::io::Builder::new()
            .write(&request_frame(&request))
            .read(&reply)
            .build();

        let mut conn = Connection::from_stream(mock);
        let message = conn.execute(&request, &RetryPolicy::new()).await.unwrap();
        assert_eq!(message.header.result_code, ResultCode::OK);
        assert_eq!(message.ops.len(), 1);
        assert_eq!(message.ops[0].name, "name");
        assert!(!conn.needs_resync());
    }

    #[tokio::test]
    async fn test_execute_recovers_within_retry_budget() {
        let request = read_request();
        let frame = request_frame(&request);
        let mismatch = reply_frame(ResultCode::CLUSTER_KEY_MISMATCH, 0, vec![]);
        let ok = reply_frame(ResultCode::OK, 0, vec![]);

        let mock = tokio_test::io::Builder::new()
            .write(&frame)
            .read(&mismatch)
            .write(&frame)
            .read(&mismatch)
            .write(&frame)
            .read(&ok)
            .build();

        let mut conn = Connection::from_stream(mock);
        let message = conn.execute(&request, &RetryPolicy::new()).await.unwrap();
        assert!(message.header.result_code.is_ok());
    }

    #[tokio::test]
    async fn test_execute_exhausts_retry_budget() {
        let request = read_request();
        let frame = request_frame(&request);
        let mismatch = reply_frame(ResultCode::CLUSTER_KEY_MISMATCH, 0, vec![]);

        let mock = tokio_test::io::Builder::new()
            .write(&frame)
            .read(&mismatch)
            .write(&frame)
            .read(&mismatch)
            .build();

        let mut conn = Connection::from_stream(mock);
        let err = conn
            .execute(&request, &RetryPolicy::new().with_attempts(2))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ClientError::Server(code) if code == ResultCode::CLUSTER_KEY_MISMATCH)
        );
    }

    #[tokio::test]
    async fn test_execute_not_found_fails_without_retry() {
        let request = read_request();
        let mock = tokio_test::io::Builder::new()
            .write(&request_frame(&request))
            .read(&reply_frame(ResultCode::KEY_NOT_FOUND, 0, vec![]))
            .build();

        let mut conn = Connection::from_stream(mock);
        let err = conn.execute(&request, &RetryPolicy::new()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(conn.needs_resync());
    }

    #[tokio::test]
    async fn test_execute_resynchronizes_after_error_reply() {
        let request = read_request();
        let frame = request_frame(&request);
        let mismatch = reply_frame(ResultCode::CLUSTER_KEY_MISMATCH, 0, vec![]);

        // the retried reply arrives behind a stray byte
        let mut offset_ok = vec![0xFF];
        offset_ok.extend_from_slice(&reply_frame(ResultCode::OK, 0, vec![]));

        let mock = tokio_test::io::Builder::new()
            .write(&frame)
            .read(&mismatch)
            .write(&frame)
            .read(&offset_ok)
            .build();

        let mut conn = Connection::from_stream(mock);
        let message = conn.execute(&request, &RetryPolicy::new()).await.unwrap();
        assert!(message.header.result_code.is_ok());
    }

    #[tokio::test]
    async fn test_execute_surfaces_truncated_reply() {
        let request = read_request();
        // a frame whose payload is too short to hold a message header
        let stub = pack_frame(MessageType::Message, &[0u8; 10]).unwrap();

        let mock = tokio_test::io::Builder::new()
            .write(&request_frame(&request))
            .read(&stub)
            .build();

        let mut conn = Connection::from_stream(mock);
        let err = conn.execute(&request, &RetryPolicy::new()).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::TruncatedPayload { .. })
        ));
        assert!(conn.needs_resync());
    }

    #[tokio::test]
    async fn test_execute_rejects_bad_frame_header() {
        let request = read_request();
        let mut bad = reply_frame(ResultCode::OK, 0, vec![]);
        bad[0] = 9; // not the protocol version

        let mock = tokio_test::io::Builder::new()
            .write(&request_frame(&request))
            .read(&bad[..FRAME_HEADER_SIZE])
            .build();

        let mut conn = Connection::from_stream(mock);
        let err = conn.execute(&request, &RetryPolicy::new()).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::MalformedFrame(_))
        ));
        assert!(conn.needs_resync());
    }

    #[tokio::test]
    async fn test_execute_rejects_oversized_reply() {
        let request = read_request();
        // a well-formed header declaring more than the client will buffer
        let huge = FrameHeader::new(MessageType::Message, MAX_RESPONSE_SIZE + 1)
            .encode()
            .unwrap();

        let mock = tokio_test::io::Builder::new()
            .write(&request_frame(&request))
            .read(&huge)
            .build();

        let mut conn = Connection::from_stream(mock);
        let err = conn.execute(&request, &RetryPolicy::new()).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::FrameTooLarge { size, max })
                if size == MAX_RESPONSE_SIZE + 1 && max == MAX_RESPONSE_SIZE
        ));
        assert!(conn.needs_resync());
    }

    #[tokio::test]
    async fn test_batch_spans_frames_until_last_bit() {
        let request = read_request();
        let first = reply_frame(
            ResultCode::OK,
            0,
            vec![Operation::write("n", &ParticleValue::Integer(1))],
        );
        let second = reply_frame(ResultCode::KEY_NOT_FOUND, INFO3_LAST, vec![]);

        let mock = tokio_test::io::Builder::new()
            .write(&request_frame(&request))
            .read(&first)
            .read(&second)
            .build();

        let mut conn = Connection::from_stream(mock);
        let records = conn
            .execute_batch(&request, &RetryPolicy::new())
            .await
            .unwrap();

        // the closing not-found message is itself a record
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].header.result_code, ResultCode::OK);
        assert_eq!(records[1].header.result_code, ResultCode::KEY_NOT_FOUND);
        assert!(records[1].header.is_last());
    }

    #[tokio::test]
    async fn test_batch_decodes_concatenated_messages() {
        let request = read_request();

        // two record messages inside a single frame payload
        let mut reply_one = RecordMessage::new(0, 0, 0)
            .with_op(Operation::write("a", &ParticleValue::Integer(1)));
        reply_one.header.result_code = ResultCode::OK;
        let mut reply_two = RecordMessage::new(0, 0, INFO3_LAST);
        reply_two.header.result_code = ResultCode::OK;

        let mut payload = reply_one.encode_reply().unwrap();
        payload.extend_from_slice(&reply_two.encode_reply().unwrap());
        let frame = pack_frame(MessageType::Message, &payload).unwrap();

        let mock = tokio_test::io::Builder::new()
            .write(&request_frame(&request))
            .read(&frame)
            .build();

        let mut conn = Connection::from_stream(mock);
        let records = conn
            .execute_batch(&request, &RetryPolicy::new())
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[1].header.is_last());
    }

    #[tokio::test]
    async fn test_batch_aborts_on_hard_error() {
        let request = read_request();
        let mock = tokio_test::io::Builder::new()
            .write(&request_frame(&request))
            .read(&reply_frame(ResultCode::SERVER_ERROR, 0, vec![]))
            .build();

        let mut conn = Connection::from_stream(mock);
        let err = conn
            .execute_batch(&request, &RetryPolicy::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Server(code) if code == ResultCode::SERVER_ERROR));
    }

    #[tokio::test]
    async fn test_batch_retries_and_discards_partial_reply() {
        let request = read_request();
        let frame = request_frame(&request);

        // first try: one good record, then a retryable abort
        let partial = reply_frame(
            ResultCode::OK,
            0,
            vec![Operation::write("a", &ParticleValue::Integer(1))],
        );
        let abort = reply_frame(ResultCode::CLUSTER_KEY_MISMATCH, 0, vec![]);
        let done = reply_frame(ResultCode::OK, INFO3_LAST, vec![]);

        let mock = tokio_test::io::Builder::new()
            .write(&frame)
            .read(&partial)
            .read(&abort)
            .write(&frame)
            .read(&done)
            .build();

        let mut conn = Connection::from_stream(mock);
        let records = conn
            .execute_batch(&request, &RetryPolicy::new())
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].header.is_last());
    }

    #[tokio::test]
    async fn test_info_exchange() {
        let request_payload = b"build\nnode";
        let request = pack_frame(MessageType::Info, request_payload).unwrap();
        let reply = pack_frame(MessageType::Info, b"build\t6.4.0.2\nnode\tBB9\n").unwrap();

        let mock = tokio_test::io::Builder::new()
            .write(&request)
            .read(&reply)
            .build();

        let mut conn = Connection::from_stream(mock);
        let values = conn.request_info(&["build", "node"]).await.unwrap();
        assert_eq!(values["build"], "6.4.0.2");
        assert_eq!(values["node"], "BB9");
    }
}
