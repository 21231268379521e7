//! Scriptable stand-in for the JMX worker.
//!
//! Speaks the framed protocol on stdin/stdout and serves a small in-memory
//! MBean catalogue. `--mode` selects a failure behaviour for tests:
//!
//! - `normal`: answer every request
//! - `silent`: read nothing, answer nothing, never exit
//! - `exit-clean`: exit with status 0 before answering anything
//! - `crash-on-start`: write to stderr and exit with status 3 at once
//! - `crash-on-call`: answer `--fail-after` requests, then write to stderr
//!   and exit with status 3 on the next one
//! - `garbage-reply`: answer `--fail-after` requests, then write to stderr,
//!   send an undecodable frame and exit with status 0
//! - `wrong-reply`: answer `--fail-after` requests, then write to stderr and
//!   answer every request with a version reply
//! - `hang-after-garbage`: like `garbage-reply`, but never exit

use std::io;
use std::process;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use clap::{Parser, ValueEnum};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use jmxlink::config::ConnectionConfig;
use jmxlink::worker::protocol::{ErrorPayload, Reply, Request, Response};
use jmxlink::worker::{
    AttributeRecord, AttributeValue, FramedChannel, InternalStat, JmxConnectionError, JmxError,
    TransportError,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Normal,
    Silent,
    ExitClean,
    CrashOnStart,
    CrashOnCall,
    GarbageReply,
    WrongReply,
    HangAfterGarbage,
}

#[derive(Parser, Debug)]
#[command(name = "mock_worker", about = "Stand-in JMX worker for tests")]
struct Args {
    /// Protocol version, passed as `-v2`.
    #[arg(short = 'v', default_value_t = 2)]
    protocol: u8,

    /// Behaviour of the worker.
    #[arg(long, value_enum, default_value_t = Mode::Normal)]
    mode: Mode,

    /// Requests answered normally before a failure mode kicks in.
    #[arg(long, default_value_t = 0)]
    fail_after: usize,
}

/// Attribute that fails with a JMX error when read.
const UNREADABLE_ATTRIBUTE: &str = "Secret";

/// MBean whose attribute listing fails with a JMX error.
const UNLISTABLE_MBEAN: &str = "test:type=Cat,name=boss";

fn catalogue() -> Vec<(&'static str, Vec<(&'static str, AttributeValue)>)> {
    vec![
        (
            "java.lang:type=Memory",
            vec![
                ("ObjectPendingFinalizationCount", AttributeValue::Integer(0)),
                ("Verbose", AttributeValue::Bool(false)),
            ],
        ),
        (
            "java.lang:type=OperatingSystem",
            vec![
                ("AvailableProcessors", AttributeValue::Integer(4)),
                ("SystemLoadAverage", AttributeValue::Double(1.5)),
            ],
        ),
        (
            "test:type=Cat,name=tomas",
            vec![
                ("Name", AttributeValue::String("tomas".to_string())),
                ("FloatValue", AttributeValue::Double(2.222222)),
                ("BoolValue", AttributeValue::Bool(true)),
                ("NumberValue", AttributeValue::Integer(3)),
                (
                    "NullValue",
                    AttributeValue::Error("can't get attribute, value is null".to_string()),
                ),
                (UNREADABLE_ATTRIBUTE, AttributeValue::Integer(42)),
            ],
        ),
        (
            UNLISTABLE_MBEAN,
            vec![("Name", AttributeValue::String("boss".to_string()))],
        ),
    ]
}

struct MockWorker {
    catalogue: Vec<(&'static str, Vec<(&'static str, AttributeValue)>)>,
    connection: Option<ConnectionConfig>,
    stats: Vec<InternalStat>,
}

impl MockWorker {
    fn new() -> Self {
        Self {
            catalogue: catalogue(),
            connection: None,
            stats: Vec::new(),
        }
    }

    /// Answer one request. The flag is true when the worker should exit
    /// after sending the response.
    fn handle(&mut self, request: Request) -> (Response, bool) {
        match request {
            Request::GetClientVersion => (Ok(Reply::Version(VERSION.to_string())), false),
            Request::Connect(config) => (self.connect(config), false),
            Request::Disconnect => {
                self.connection = None;
                (Ok(Reply::Done), true)
            }
            Request::QueryMBeanNames { pattern } => (self.query_names(&pattern), false),
            Request::GetMBeanAttributeNames { mbean_name } => {
                (self.attribute_names(&mbean_name), false)
            }
            Request::GetMBeanAttributes {
                mbean_name,
                attributes,
            } => (self.attributes(&mbean_name, &attributes), false),
            Request::GetInternalStats => (
                Ok(Reply::InternalStats(std::mem::take(&mut self.stats))),
                false,
            ),
        }
    }

    fn connect(&mut self, config: ConnectionConfig) -> Response {
        info!(config = %config.format(true), "connect");
        if config.hostname == "unreachable" {
            return Err(ErrorPayload::Connection(JmxConnectionError::new(format!(
                "Connection refused to host: {}:{}",
                config.hostname, config.port
            ))));
        }
        self.connection = Some(config);
        Ok(Reply::Done)
    }

    fn ensure_connected(&self) -> Result<(), ErrorPayload> {
        match self.connection {
            Some(_) => Ok(()),
            None => Err(ErrorPayload::Connection(JmxConnectionError::new(
                "not connected to a JMX endpoint",
            ))),
        }
    }

    fn query_names(&self, pattern: &str) -> Response {
        self.ensure_connected()?;
        if !pattern.contains(':') {
            return Err(ErrorPayload::Jmx(JmxError::new(
                format!("cannot parse MBean glob pattern: '{}'", pattern),
                "Key properties cannot be empty",
                "javax.management.MalformedObjectNameException\n\tat javax.management.ObjectName.construct",
            )));
        }

        let names = self
            .catalogue
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| glob_match(pattern, name))
            .map(str::to_string)
            .collect();
        Ok(Reply::Names(names))
    }

    fn find(&self, mbean_name: &str) -> Result<&[(&'static str, AttributeValue)], ErrorPayload> {
        self.catalogue
            .iter()
            .find(|(name, _)| *name == mbean_name)
            .map(|(_, attributes)| attributes.as_slice())
            .ok_or_else(|| {
                ErrorPayload::Jmx(JmxError::new(
                    format!("instance not found: {}", mbean_name),
                    "",
                    "",
                ))
            })
    }

    fn attribute_names(&self, mbean_name: &str) -> Response {
        self.ensure_connected()?;
        if mbean_name == UNLISTABLE_MBEAN {
            return Err(ErrorPayload::Jmx(JmxError::new(
                "can't get attribute names",
                "java.lang.SecurityException: access denied",
                "java.lang.SecurityException: access denied\n\tat Cat.getMBeanInfo",
            )));
        }

        let attributes = self.find(mbean_name)?;
        Ok(Reply::Names(
            attributes.iter().map(|(name, _)| name.to_string()).collect(),
        ))
    }

    fn attributes(&mut self, mbean_name: &str, wanted: &[String]) -> Response {
        self.ensure_connected()?;
        let started = Instant::now();
        let result = self.read_attributes(mbean_name, wanted);

        if self
            .connection
            .as_ref()
            .is_some_and(|config| config.enable_internal_stats)
        {
            self.stats.push(InternalStat {
                stat_type: "getMBeanAttributes".to_string(),
                mbean: mbean_name.to_string(),
                attrs: wanted.to_vec(),
                response_count: result.as_ref().map(|r| r.len() as i64).unwrap_or(0),
                milliseconds: started.elapsed().as_secs_f64() * 1000.0,
                start_timestamp: epoch_millis(),
                successful: result.is_ok(),
            });
        }

        result.map(Reply::Attributes)
    }

    fn read_attributes(
        &self,
        mbean_name: &str,
        wanted: &[String],
    ) -> Result<Vec<AttributeRecord>, ErrorPayload> {
        let attributes = self.find(mbean_name)?;

        let mut records = Vec::with_capacity(wanted.len());
        for name in wanted {
            if name == UNREADABLE_ATTRIBUTE {
                return Err(ErrorPayload::Jmx(JmxError::new(
                    format!("can't read attribute '{}'", name),
                    "java.lang.UnsupportedOperationException",
                    "java.lang.UnsupportedOperationException\n\tat Cat.getSecret",
                )));
            }
            let value = attributes
                .iter()
                .find(|(attribute, _)| *attribute == name.as_str())
                .map(|(_, value)| value.clone())
                .ok_or_else(|| {
                    ErrorPayload::Jmx(JmxError::new(
                        format!("attribute not found: {}", name),
                        "",
                        "",
                    ))
                })?;
            records.push(AttributeRecord::new(
                format!("{},attr={}", mbean_name, name),
                value,
            ));
        }
        Ok(records)
    }
}

/// Match `name` against a glob where `*` matches any run of characters and
/// `?` one character.
fn glob_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(c) if *c == '?' || *c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    n = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn crash(reason: &str) -> ! {
    eprintln!("Exception in thread \"main\" java.lang.IllegalStateException: {}", reason);
    eprintln!("\tat org.newrelic.nrjmx.v2.JMXServiceHandler.run(JMXServiceHandler.java:42)");
    process::exit(3);
}

/// A length prefix of 1 followed by 0xc1, a byte MessagePack never uses.
const GARBAGE_FRAME: [u8; 5] = [0, 0, 0, 1, 0xc1];

async fn send_garbage<W, R>(channel: FramedChannel<W, R>, method: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    eprintln!("corrupting reply to {}", method);
    let (mut output, _input) = channel.into_inner();
    output.write_all(&GARBAGE_FRAME).await?;
    output.flush().await
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!(protocol = args.protocol, mode = ?args.mode, "mock worker started");

    match args.mode {
        Mode::CrashOnStart => crash("could not start the JVM"),
        Mode::ExitClean => return,
        Mode::Silent => loop {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        },
        Mode::Normal
        | Mode::CrashOnCall
        | Mode::GarbageReply
        | Mode::WrongReply
        | Mode::HangAfterGarbage => {}
    }

    let mut channel = FramedChannel::open(tokio::io::stdout(), tokio::io::stdin());
    let mut worker = MockWorker::new();
    let mut answered = 0usize;

    loop {
        let request: Request = match channel.receive().await {
            Ok(request) => request,
            Err(TransportError::Closed) => {
                info!("stdin closed, exiting");
                process::exit(0);
            }
            Err(e) => {
                error!(error = %e, "failed to read request");
                process::exit(2);
            }
        };
        debug!(method = request.method(), "request");

        let failing = answered >= args.fail_after;
        let (response, exit) = match args.mode {
            Mode::CrashOnCall if failing => {
                crash(&format!("crashed while handling {}", request.method()))
            }
            Mode::GarbageReply | Mode::HangAfterGarbage if failing => {
                if let Err(e) = send_garbage(channel, request.method()).await {
                    error!(error = %e, "failed to write garbage frame");
                }
                if args.mode == Mode::GarbageReply {
                    process::exit(0);
                }
                loop {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
            }
            Mode::WrongReply if failing => {
                eprintln!("answering {} with a version reply", request.method());
                (Ok(Reply::Version(VERSION.to_string())), false)
            }
            _ => worker.handle(request),
        };
        if let Err(e) = channel.send(&response).await {
            error!(error = %e, "failed to write response");
            process::exit(2);
        }
        answered += 1;

        if exit {
            info!("disconnected, exiting");
            process::exit(0);
        }
    }
}
