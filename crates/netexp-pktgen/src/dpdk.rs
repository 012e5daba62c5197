//! DPDK pktgen controller.
//!
//! pktgen runs on the remote host inside a pseudo-terminal and is driven
//! through its interactive console. Every command waits for the idle prompt
//! (or the command timeout) before the next one is sent, and counters are
//! read with the statistics query protocol from [`crate::stats`].
//!
//! pktgen must be built with Lua support for statistics queries to work.

use std::fmt;

use tracing::{debug, info, warn};

use netexp_console::{CancelAction, StreamWatcher, WatchOptions};
use netexp_core::{
    Channel, Error, ExecRequest, NetexpConfig, PktgenSettings, RemoteHost, Result,
};

use crate::address::range_end;
use crate::generator::Pktgen;
use crate::options::{DpdkPktgenOptions, TrafficParams};
use crate::patterns::{COMMAND_PROMPT, READY_PROMPT, STAT_REPLY};
use crate::stats::{parse_mean_pkt_size, parse_stat_value, stat_query, Stat};

/// Completion criterion of the current transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxTarget {
    /// Nothing started since launch
    Idle,
    /// Done once `port` has transmitted `count` packets in total
    Bounded { port: u16, count: u64 },
    /// Transmits until stopped
    Unbounded,
}

fn check_capacity(capacity: f64) -> Result<()> {
    if capacity > 0.0 && capacity <= 100.0 {
        Ok(())
    } else {
        Err(Error::InvalidRate(capacity))
    }
}

/// DPDK pktgen running on a remote host.
pub struct DpdkPktgen<H: RemoteHost> {
    host: H,
    eal_args: String,
    options: DpdkPktgenOptions,
    settings: PktgenSettings,
    watcher: StreamWatcher,
    console: Option<Box<dyn Channel>>,
    ready: bool,
    target: TxTarget,
}

impl<H: RemoteHost> fmt::Debug for DpdkPktgen<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DpdkPktgen")
            .field("host", &self.host.hostname())
            .field("eal_args", &self.eal_args)
            .field("options", &self.options)
            .field("active", &self.is_active())
            .field("ready", &self.ready)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl<H: RemoteHost> DpdkPktgen<H> {
    /// Create a controller without launching pktgen.
    ///
    /// `dpdk_config` is rendered once into the EAL arguments; a
    /// [`DpdkConfig`](crate::DpdkConfig) or a preformatted string both work.
    pub fn new(
        host: H,
        dpdk_config: impl fmt::Display,
        options: DpdkPktgenOptions,
        settings: PktgenSettings,
        watcher: StreamWatcher,
    ) -> Self {
        Self {
            host,
            eal_args: dpdk_config.to_string(),
            options,
            settings,
            watcher,
            console: None,
            ready: false,
            target: TxTarget::Idle,
        }
    }

    /// Create a controller and launch pktgen.
    pub fn connect(
        host: H,
        dpdk_config: impl fmt::Display,
        options: DpdkPktgenOptions,
        config: &NetexpConfig,
    ) -> Result<Self> {
        let mut pktgen = Self::new(
            host,
            dpdk_config,
            options,
            config.pktgen.clone(),
            StreamWatcher::new(config.watch.clone()),
        );
        pktgen.launch()?;
        Ok(pktgen)
    }

    /// Remote command line used to start pktgen.
    pub fn launch_command(&self) -> String {
        let sudo = if self.settings.use_sudo { "sudo " } else { "" };
        format!(
            "{}{} {} -- {}",
            sudo,
            self.settings.binary,
            self.eal_args,
            self.options.to_args()
        )
    }

    /// Whether pktgen is running under this controller.
    pub fn is_active(&self) -> bool {
        self.console.is_some()
    }

    /// Whether pktgen has printed its prompt since launch.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Transmitted-packet count at which the current run completes.
    ///
    /// `None` before the first `start` and after an unbounded one.
    pub fn target_tx_count(&self) -> Option<u64> {
        match self.target {
            TxTarget::Bounded { count, .. } => Some(count),
            TxTarget::Idle | TxTarget::Unbounded => None,
        }
    }

    /// Launch options.
    pub fn options(&self) -> &DpdkPktgenOptions {
        &self.options
    }

    /// Host pktgen runs on.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// The pktgen console, for handing off to an interactive passthrough.
    pub fn console_mut(&mut self) -> Result<&mut dyn Channel> {
        match self.console.as_mut() {
            Some(console) => Ok(console.as_mut()),
            None => Err(Error::PktgenInactive),
        }
    }

    /// Wait for pktgen to print its prompt.
    ///
    /// Fails if pktgen already exited with a non-zero status, typically
    /// because ports were not bound to DPDK or hugepages were not allocated.
    /// An interrupt closes the console.
    pub fn wait_ready(&mut self, forward: bool) -> Result<()> {
        let window = Some(self.watcher.settings().max_match_length);
        let console = self.console.as_mut().ok_or(Error::PktgenInactive)?;

        if console.exit_status_ready()? {
            if let Some(status) = console.exit_status()? {
                if status != 0 {
                    warn!("pktgen exited with status {} before becoming ready", status);
                    self.deactivate();
                    return Err(Error::PktgenExited { status });
                }
            }
        }

        let watched = self.watcher.watch(
            console.as_mut(),
            WatchOptions::until_pattern(READY_PROMPT.clone())
                .with_window(window)
                .with_cancel(CancelAction::Close)
                .with_forwarding(forward, forward),
        );
        let output = match watched {
            Ok(output) => output,
            Err(Error::Interrupted) => {
                self.console = None;
                self.ready = false;
                return Err(Error::Interrupted);
            }
            Err(e) => return Err(e),
        };

        if !READY_PROMPT.is_match_in_tail(&output, window) {
            warn!("pktgen stopped without printing its prompt");
            self.deactivate();
            return Err(Error::PktgenNotReady { transcript: output });
        }

        self.ready = true;
        info!("pktgen ready on {}", self.host.hostname());
        Ok(())
    }

    /// Run console commands, each waiting for the prompt or the command
    /// timeout.
    pub fn commands<I, S>(&mut self, commands: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let timeout = self.settings.command_timeout();
        let console = self.console.as_mut().ok_or(Error::PktgenInactive)?;
        self.watcher
            .run_commands(console.as_mut(), commands, timeout, Some(&*COMMAND_PROMPT))
    }

    /// Reset all counters.
    pub fn clear(&mut self) -> Result<()> {
        self.commands(["clr"])?;
        Ok(())
    }

    /// Read one statistic for `port`.
    pub fn port_stat(&mut self, stat: Stat, port: u16) -> Result<u64> {
        self.ensure_ready()?;

        let window = Some(self.watcher.settings().max_match_length);
        let console = self.console.as_mut().ok_or(Error::PktgenInactive)?;
        console.send(stat_query(stat, port).as_bytes())?;

        let output = self.watcher.watch(
            console.as_mut(),
            WatchOptions::until_pattern(STAT_REPLY.clone())
                .with_window(window)
                .with_cancel(CancelAction::Interrupt)
                .silent(),
        )?;

        let value = parse_stat_value(&output)?;
        debug!("{} on port {} = {}", stat, port, value);
        Ok(value)
    }

    /// Received packets per second.
    pub fn get_pkts_rx_rate(&mut self, port: Option<u16>) -> Result<u64> {
        self.port_stat(Stat::PktsRx, self.rx_port(port))
    }

    /// Transmitted packets per second.
    pub fn get_pkts_tx_rate(&mut self, port: Option<u16>) -> Result<u64> {
        self.port_stat(Stat::PktsTx, self.tx_port(port))
    }

    /// Received megabits per second.
    pub fn get_mbits_rx(&mut self, port: Option<u16>) -> Result<u64> {
        self.port_stat(Stat::MbitsRx, self.rx_port(port))
    }

    /// Transmitted megabits per second.
    pub fn get_mbits_tx(&mut self, port: Option<u16>) -> Result<u64> {
        self.port_stat(Stat::MbitsTx, self.tx_port(port))
    }

    fn rx_port(&self, port: Option<u16>) -> u16 {
        port.unwrap_or(self.options.rx_port)
    }

    fn tx_port(&self, port: Option<u16>) -> u16 {
        port.unwrap_or(self.options.tx_port)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::PktgenInactive)
        }
    }

    fn ensure_ready(&mut self) -> Result<()> {
        self.ensure_active()?;
        if !self.ready {
            self.wait_ready(false)?;
        }
        Ok(())
    }

    fn deactivate(&mut self) {
        self.ready = false;
        if let Some(mut console) = self.console.take() {
            if let Err(e) = console.close() {
                debug!("Closing pktgen console: {}", e);
            }
        }
    }
}

impl<H: RemoteHost> Pktgen for DpdkPktgen<H> {
    fn launch(&mut self) -> Result<()> {
        if self.is_active() {
            return Err(Error::InvalidInput("pktgen is already running".to_string()));
        }

        let command = self.launch_command();
        info!("Launching pktgen on {}: {}", self.host.hostname(), command);
        let console = self.host.exec(&ExecRequest::new(command).with_pty())?;

        self.console = Some(console);
        self.ready = false;
        self.target = TxTarget::Idle;
        Ok(())
    }

    fn set_params(&mut self, params: &TrafficParams) -> Result<()> {
        let base = match params.init_ip {
            Some(ip) => ip,
            None => self.settings.default_init_ip()?,
        };
        let max_src = range_end(base, params.nb_src)?;
        let max_dst = range_end(base, params.nb_dst)?;
        let port = self.tx_port(params.tx_port);
        let size = params.pkt_size;

        self.ensure_ready()?;
        self.commands([
            format!("range {port} dst port start {}", params.init_port),
            format!("range {port} src ip max {max_src}"),
            format!("range {port} dst ip max {max_dst}"),
            format!("range {port} size start {size}"),
            format!("range {port} size min {size}"),
            format!("range {port} size max {size}"),
        ])?;
        Ok(())
    }

    fn set_pcap(&mut self, pcap: &str) -> Result<()> {
        let changed = self.options.pcap.as_deref() != Some(pcap);
        self.options.pcap = Some(pcap.to_string());

        if self.is_active() && changed {
            info!("Relaunching pktgen to replay {}", pcap);
            self.close()?;
            self.launch()?;
            self.watcher.pause(self.settings.relaunch_settle());
            self.wait_ready(false)?;
        }
        Ok(())
    }

    fn get_mean_pkt_size(&mut self) -> Result<f64> {
        let pcap = self
            .options
            .pcap
            .clone()
            .ok_or_else(|| Error::InvalidInput("no pcap configured".to_string()))?;

        let request = ExecRequest::new(format!("{} -z {}", self.settings.capinfos, pcap));
        let mut app = self.host.exec(&request)?;
        let output = self.watcher.watch(
            app.as_mut(),
            WatchOptions::until_exit()
                .with_cancel(CancelAction::Interrupt)
                .silent(),
        )?;
        let status = self.watcher.wait_exit_status(app.as_mut())?;
        if let Err(e) = app.close() {
            debug!("Closing capinfos channel: {}", e);
        }

        if status != 0 {
            return Err(Error::PcapInspect {
                status: Some(status),
                output,
            });
        }
        parse_mean_pkt_size(&output)
    }

    fn start(&mut self, capacity: f64, nb_pkts: u64, tx_port: Option<u16>) -> Result<()> {
        check_capacity(capacity)?;
        let port = self.tx_port(tx_port);
        self.ensure_ready()?;

        let mut commands = Vec::new();
        if self.options.pcap.is_some() {
            commands.push(format!("enable {port} pcap"));
        }

        self.target = if nb_pkts == 0 {
            TxTarget::Unbounded
        } else {
            let sent = self.port_stat(Stat::OutPackets, port)?;
            TxTarget::Bounded {
                port,
                count: sent.saturating_add(nb_pkts),
            }
        };
        debug!("Transmission target on port {}: {:?}", port, self.target);

        commands.push(format!("set {port} count {nb_pkts}"));
        commands.push(format!("set {port} rate {capacity}"));
        commands.push(format!("start {port}"));
        self.commands(&commands)?;
        Ok(())
    }

    fn set_rate(&mut self, capacity: f64, tx_port: Option<u16>) -> Result<()> {
        check_capacity(capacity)?;
        let port = self.tx_port(tx_port);
        self.commands([format!("set {port} rate {capacity}")])?;
        Ok(())
    }

    fn wait_transmission_done(&mut self) -> Result<()> {
        self.ensure_active()?;
        let (port, target) = match self.target {
            TxTarget::Idle => return Ok(()),
            TxTarget::Unbounded => return Err(Error::UnboundedTransmission),
            TxTarget::Bounded { port, count } => (port, count),
        };

        // The first poll is only a baseline; a stall is two equal polls in a row.
        let mut previous = None;
        loop {
            self.watcher.pause(self.settings.progress_poll());

            let sent = self.port_stat(Stat::OutPackets, port)?;
            if sent >= target {
                info!("Transmission done on port {} ({} packets)", port, sent);
                return Ok(());
            }
            if previous == Some(sent) {
                warn!(
                    "pktgen is not making progress on port {} ({} of {} packets)",
                    port, sent, target
                );
                return Err(Error::NoProgress {
                    tx_pkts: sent,
                    target,
                });
            }
            previous = Some(sent);
        }
    }

    fn stop(&mut self, tx_port: Option<u16>) -> Result<()> {
        let port = self.tx_port(tx_port);
        self.commands([format!("stop {port}")])?;
        Ok(())
    }

    fn clean_stats(&mut self) -> Result<()> {
        self.clear()
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut console) = self.console.take() else {
            return Ok(());
        };

        info!("Closing pktgen on {}", self.host.hostname());
        if let Err(e) = console.send(b"quit\n") {
            warn!("Failed to send quit to pktgen: {}", e);
        }
        self.watcher.pause(self.settings.quit_grace());
        self.ready = false;
        self.target = TxTarget::Idle;
        console.close()
    }

    fn get_nb_rx_pkts(&mut self, port: Option<u16>) -> Result<u64> {
        self.port_stat(Stat::InPackets, self.rx_port(port))
    }

    fn get_nb_rx_bytes(&mut self, port: Option<u16>) -> Result<u64> {
        self.port_stat(Stat::InBytes, self.rx_port(port))
    }

    fn get_nb_tx_pkts(&mut self, port: Option<u16>) -> Result<u64> {
        self.port_stat(Stat::OutPackets, self.tx_port(port))
    }

    fn get_nb_tx_bytes(&mut self, port: Option<u16>) -> Result<u64> {
        self.port_stat(Stat::OutBytes, self.tx_port(port))
    }

    fn get_rx_throughput(&mut self, port: Option<u16>) -> Result<u64> {
        Ok(self.get_mbits_rx(port)?.saturating_mul(1_000_000))
    }

    fn get_tx_throughput(&mut self, port: Option<u16>) -> Result<u64> {
        Ok(self.get_mbits_tx(port)?.saturating_mul(1_000_000))
    }
}

impl<H: RemoteHost> Drop for DpdkPktgen<H> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close pktgen: {}", e);
        }
    }
}
