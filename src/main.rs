use std::cell::Cell;
use std::net::Ipv4Addr;
use std::process::ExitCode;
use std::rc::Rc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use helios_net::{
    AttributeRegistry, CsmaHelper, DataRate, DelayConfigurable, DeviceId, Ipv4AddressHelper,
    Packet, PointToPointHelper, RateConfigurable, SimError, SimResult, Simulator, TimeDelta,
};

/// Four routers, a host LAN and a late-added branch LAN.
#[derive(Debug, Parser)]
#[command(name = "helios-net", version)]
struct Cli {
    /// Default data rate of every device type
    #[arg(long, alias = "DefaultRate", default_value = "10Mbps")]
    default_rate: DataRate,

    /// Default propagation delay of every channel type
    #[arg(long, default_value = "2ms")]
    default_delay: TimeDelta,

    /// Extra type default, `Type::Attribute=value` (repeatable)
    #[arg(long = "set", value_name = "TYPE::ATTR=VALUE")]
    overrides: Vec<String>,

    /// Echo requests sent across each link
    #[arg(long, default_value_t = 3)]
    packets: u32,

    /// Echo request size in bytes
    #[arg(long, default_value_t = 1024)]
    packet_size: usize,

    /// Spacing between echo requests
    #[arg(long, default_value = "10ms")]
    interval: TimeDelta,

    /// Enable verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info".into()),
        1 => tracing_subscriber::EnvFilter::new("debug"),
        _ => tracing_subscriber::EnvFilter::new("trace"),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "simulation failed");
            ExitCode::FAILURE
        }
    }
}

fn registry(cli: &Cli) -> SimResult<AttributeRegistry> {
    let mut config = AttributeRegistry::new();
    for device in ["PointToPointNetDevice", "CsmaNetDevice"] {
        config.set_default(device, "DataRate", cli.default_rate)?;
    }
    for channel in ["PointToPointChannel", "CsmaChannel"] {
        config.set_default(channel, "Delay", cli.default_delay)?;
    }
    for entry in &cli.overrides {
        let (name, value) = entry.split_once('=').ok_or_else(|| SimError::InvalidValue {
            kind: "override",
            value: entry.clone(),
        })?;
        config.set_default_str(name, value)?;
    }
    Ok(config)
}

fn run(cli: &Cli) -> SimResult<()> {
    info!(rate = %cli.default_rate, delay = %cli.default_delay, "building network");
    let mut sim = Simulator::new(registry(cli)?);
    let mut address = Ipv4AddressHelper::new();
    let mask = Ipv4Addr::new(255, 255, 255, 0);

    let hosts = sim.create_nodes(3);
    let routers = sim.create_nodes(4);
    let p2p = PointToPointHelper::new();

    // Subnet 1: the hosts share a LAN with router 0.
    let lan = CsmaHelper::new().install(&mut sim, &[hosts[0], hosts[1], hosts[2], routers[0]])?;
    address.set_base(Ipv4Addr::new(192, 168, 20, 0), mask)?;
    address.assign(&mut sim, &lan.devices)?;

    // Subnet 2: router 0 to router 1, sped up by path after install.
    let subnet2 = p2p.install(&mut sim, routers[0], routers[1])?;
    address.set_base(Ipv4Addr::new(192, 168, 21, 0), mask)?;
    address.assign(&mut sim, &subnet2.devices)?;
    sim.set_str("/NodeList/3/DeviceList/1/$PointToPointNetDevice", "DataRate", "50Mbps")?;
    sim.set_str("/NodeList/4/DeviceList/0/$PointToPointNetDevice", "DataRate", "50Mbps")?;
    sim.set_path(
        &format!("/ChannelList/{}/$PointToPointChannel/Delay", subnet2.channel.index()),
        TimeDelta::from_millis(4),
    )?;

    // Subnet 3: router 1 to router 2, type defaults only.
    let subnet3 = p2p.install(&mut sim, routers[1], routers[2])?;
    address.set_base(Ipv4Addr::new(192, 168, 22, 0), mask)?;
    address.assign(&mut sim, &subnet3.devices)?;

    // Subnet 4: router 1 to router 3, configured through the objects.
    let subnet4 = p2p.install(&mut sim, routers[1], routers[3])?;
    for device in &subnet4.devices {
        sim.device_mut(*device)?.set_data_rate(DataRate::from_mbps(100))?;
    }
    sim.channel_mut(subnet4.channel)?.set_delay(TimeDelta::from_millis(5))?;
    address.set_base(Ipv4Addr::new(192, 168, 23, 0), mask)?;
    address.assign(&mut sim, &subnet4.devices)?;

    let links = [
        ("subnet1", lan.devices[0], lan.devices[3]),
        ("subnet2", subnet2.devices[0], subnet2.devices[1]),
        ("subnet3", subnet3.devices[0], subnet3.devices[1]),
        ("subnet4", subnet4.devices[0], subnet4.devices[1]),
    ];
    let mut replies = Vec::new();
    for (name, from, to) in links {
        replies.push((name, ping(&mut sim, from, to, cli)?));
    }
    sim.run()?;
    summary(&sim, &replies);
    sim.destroy()?;

    // Branch LAN hung off router 2 after the first run.
    let branch = sim.create_nodes(3);
    let mut csma = CsmaHelper::new();
    csma.set_device_attribute("DataRate", "100Mbps")?;
    let subnet5 = csma.install(&mut sim, &[routers[2], branch[0], branch[1], branch[2]])?;
    address.set_base(Ipv4Addr::new(192, 168, 24, 0), mask)?;
    address.assign(&mut sim, &subnet5.devices)?;

    let replies = vec![("subnet5", ping(&mut sim, subnet5.devices[1], subnet5.devices[0], cli)?)];
    sim.clear_trace();
    sim.run()?;
    summary(&sim, &replies);
    sim.destroy()
}

/// Echo `cli.packets` requests from `from`; `to` answers each one.
/// Returns the counter of replies seen by `from`.
fn ping(sim: &mut Simulator, from: DeviceId, to: DeviceId, cli: &Cli) -> SimResult<Rc<Cell<u32>>> {
    sim.set_receive_callback(to, move |sim: &mut Simulator, delivery| {
        if delivery.from != from {
            return Ok(());
        }
        let reply = delivery.packet.clone();
        sim.schedule_now(move |sim: &mut Simulator| sim.send(to, reply).map(|_| ()));
        Ok(())
    })?;

    let replies = Rc::new(Cell::new(0));
    let counter = Rc::clone(&replies);
    sim.set_receive_callback(from, move |_: &mut Simulator, delivery| {
        if delivery.from == to {
            counter.set(counter.get() + 1);
        }
        Ok(())
    })?;

    let mut at = TimeDelta::ZERO;
    for _ in 0..cli.packets {
        let packet = Packet::zeroed(cli.packet_size);
        sim.schedule(at, move |sim: &mut Simulator| sim.send(from, packet).map(|_| ()))?;
        at = at.checked_add(cli.interval).ok_or(SimError::TimeOverflow)?;
    }
    Ok(replies)
}

fn summary(sim: &Simulator, replies: &[(&str, Rc<Cell<u32>>)]) {
    info!(
        now = %sim.now(),
        events = sim.events_processed(),
        fingerprint = %format!("{:016x}", sim.fingerprint()),
        "run complete"
    );
    for (name, count) in replies {
        info!(subnet = *name, replies = count.get(), "echo");
    }
    for device in sim.devices() {
        let stats = device.stats();
        let address = device
            .addresses()
            .first()
            .map(|iface| iface.address.to_string())
            .unwrap_or_default();
        info!(
            device = %device.id(),
            node = %device.node(),
            %address,
            rate = %device.data_rate(),
            tx = stats.tx_packets,
            rx = stats.rx_packets,
            "device"
        );
    }
}
