use clap::Parser;
use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use dataport::{Consumer, Notification, OutboundPort, OverflowPlacement};
use eyre::{eyre, Context, Result};
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use uartdrv::{Config, DriverContext, FdDevice};

const DEVICE_TOKEN: u64 = 0;

#[derive(Parser)]
#[command(name = "uartdrv")]
#[command(about = "serial driver bridging a device to shared-memory dataports")]
#[command(version)]
struct Args {
    #[arg(help = "configuration file path (toml format)")]
    config: String,

    #[arg(short, long, help = "device node, overrides [device] path")]
    device: Option<PathBuf>,

    #[arg(long, help = "clear the overflow flag once the consumer caught up")]
    clear_overflow: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load config path={}", args.config))?;
    check_clear_overflow(args.clear_overflow, config.driver.overflow_placement)?;
    let path = args
        .device
        .or(config.device.path)
        .ok_or_else(|| eyre!("no device path in arguments or config"))?;
    let device = FdDevice::open(&path)
        .with_context(|| format!("failed to open device path={}", path.display()))?;
    info!(path = %path.display(), "device opened");

    let notification = Notification::new()?;
    let consumer_notification = notification.try_clone()?;
    let wake = notification.try_clone()?;
    let mut ctx = DriverContext::init(&config.driver, device, notification)?;

    let consumer = Consumer::attach(ctx.inbound())?;
    let consumer = consumer.with_notification(consumer_notification);
    let app_port = OutboundPort::from_fd(
        ctx.outbound_port().memory_fd().try_clone_to_owned()?,
        ctx.outbound_port().size(),
    )?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("received ctrl+c, shutting down");
        r.store(false, Ordering::SeqCst);
        if let Err(e) = wake.notify() {
            warn!(error = %e, "failed to wake consumer");
        }
    })?;

    let consumer_thread = {
        let running = running.clone();
        let clear_overflow = args.clear_overflow;
        thread::Builder::new()
            .name("uartdrv-consumer".into())
            .spawn(move || run_consumer(consumer, running, clear_overflow))?
    };

    let (request_tx, request_rx) = channel::bounded(1);
    let (ack_tx, ack_rx) = channel::bounded(1);
    thread::Builder::new()
        .name("uartdrv-stdin".into())
        .spawn(move || {
            if let Err(e) = run_stdin(app_port, request_tx, ack_rx) {
                error!(error = %e, "stdin forwarding stopped");
            }
        })?;

    let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)?;
    epoll.add(
        ctx.device(),
        EpollEvent::new(EpollFlags::EPOLLIN, DEVICE_TOKEN),
    )?;
    let mut events = vec![EpollEvent::empty(); 4];
    let timeout = EpollTimeout::from(100u16);
    let mut stdin_open = true;

    while running.load(Ordering::SeqCst) {
        let nfds = match epoll.wait(&mut events, timeout) {
            Ok(n) => n,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        };

        let mut hangup = false;
        for event in events.iter().take(nfds) {
            if event.data() != DEVICE_TOKEN {
                continue;
            }
            let flags = event.events();
            if flags.contains(EpollFlags::EPOLLIN) {
                // Errors were already logged where they happened.
                if let Err(e) = ctx.handle_interrupt() {
                    debug!(error = %e, "drain aborted");
                }
            }
            if flags.intersects(EpollFlags::EPOLLHUP | EpollFlags::EPOLLERR) {
                hangup = true;
            }
        }

        if !ctx.is_valid() {
            error!("driver context no longer valid, stopping");
            break;
        }
        if hangup {
            info!("device hung up");
            break;
        }

        if stdin_open {
            stdin_open = forward_outbound(&mut ctx, &request_rx, &ack_tx);
        }
    }

    running.store(false, Ordering::SeqCst);
    if let Err(e) = ctx.notifier().notify() {
        warn!(error = %e, "failed to wake consumer");
    }
    match consumer_thread.join() {
        Ok(result) => result?,
        Err(_) => return Err(eyre!("consumer thread panicked")),
    }

    finish(&ctx)
}

/// The consumer can only clear a flag that lives in the shared region.
fn check_clear_overflow(clear_overflow: bool, placement: OverflowPlacement) -> Result<()> {
    if clear_overflow && placement == OverflowPlacement::Internal {
        return Err(eyre!("--clear-overflow needs a last-byte overflow flag"));
    }
    Ok(())
}

/// Reports the final counters. A context invalidated by a consistency
/// violation turns into a failing exit status.
fn finish(ctx: &DriverContext<FdDevice>) -> Result<()> {
    let stats = ctx.stats();
    info!(
        interrupts = stats.interrupts,
        bytes_received = stats.bytes_received,
        bytes_discarded = stats.bytes_discarded,
        buffer_full = stats.buffer_full,
        notifications = stats.notifications,
        "driver stopped"
    );
    if !ctx.is_valid() {
        return Err(eyre!("driver stopped after a consistency violation"));
    }
    Ok(())
}

/// Services at most one pending write request. Returns false once the
/// stdin side has gone away.
fn forward_outbound(
    ctx: &mut DriverContext<FdDevice>,
    requests: &Receiver<usize>,
    acks: &Sender<()>,
) -> bool {
    match requests.try_recv() {
        Ok(len) => {
            if let Err(e) = ctx.write(len) {
                debug!(error = %e, "outbound write failed");
            }
            acks.send(()).is_ok()
        }
        Err(TryRecvError::Empty) => true,
        Err(TryRecvError::Disconnected) => {
            debug!("stdin closed");
            false
        }
    }
}

fn run_stdin(mut port: OutboundPort, requests: Sender<usize>, acks: Receiver<()>) -> Result<()> {
    let mut stdin = std::io::stdin().lock();
    loop {
        let n = stdin.read(port.as_mut_slice())?;
        if n == 0 {
            return Ok(());
        }
        requests.send(n)?;
        // The port is reused only after the driver has sent its contents.
        acks.recv()?;
    }
}

fn run_consumer(
    mut consumer: Consumer,
    running: Arc<AtomicBool>,
    clear_overflow: bool,
) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    let mut overflow_reported = false;

    while running.load(Ordering::SeqCst) {
        consumer.wait()?;

        loop {
            let window = consumer.read_contiguous();
            if window.is_empty() {
                break;
            }
            stdout.write_all(window)?;
            let n = window.len();
            consumer.consume(n)?;
        }
        stdout.flush()?;

        if consumer.is_overflow() == Some(true) {
            if clear_overflow {
                consumer.clear_overflow()?;
                info!("consumer caught up, overflow cleared");
                overflow_reported = false;
            } else if !overflow_reported {
                warn!("inbound overflow, data is being dropped");
                overflow_reported = true;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::OwnedFd;
    use std::os::unix::net::UnixStream;
    use uartdrv::DriverConfig;

    fn context() -> (DriverContext<FdDevice>, UnixStream) {
        let (local, peer) = UnixStream::pair().unwrap();
        local.set_nonblocking(true).unwrap();
        let device = FdDevice::from_fd(OwnedFd::from(local));
        let notification = Notification::new().unwrap();
        let config = DriverConfig::default();
        let ctx = DriverContext::init(&config, device, notification).unwrap();
        (ctx, peer)
    }

    #[test]
    fn test_clean_stop_exits_successfully() {
        let (ctx, _peer) = context();
        assert!(finish(&ctx).is_ok());
    }

    #[test]
    fn test_invalidated_context_fails_exit() {
        let (mut ctx, _peer) = context();
        ctx.invalidate();
        assert!(finish(&ctx).is_err());
    }

    #[test]
    fn test_clear_overflow_needs_shared_flag() {
        let internal = OverflowPlacement::Internal;
        let last_byte = OverflowPlacement::LastByte;
        assert!(check_clear_overflow(true, internal).is_err());
        assert!(check_clear_overflow(true, last_byte).is_ok());
        assert!(check_clear_overflow(false, internal).is_ok());
    }
}
