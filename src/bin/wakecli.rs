use clap::Parser;
use std::net::SocketAddr;
use wagow::mac::MacAddr;
use wagow::udp::UdpClient;

/// Send a single Wake-on-LAN/WAN magic packet.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Hardware address to wake, in xx:xx:xx:xx:xx:xx form.
    target: MacAddr,

    /// Destination host, with an optional port (defaults to 9).
    #[arg(long, default_value = "255.255.255.255")]
    address: String,

    /// SecureOn password of 0, 4 or 6 bytes.
    #[arg(long, env = "WAGOW_PASSWORD", default_value = "")]
    password: String,

    /// Local address to send from. Defaults to an ephemeral port on all
    /// interfaces.
    #[arg(long)]
    bind_addr: Option<SocketAddr>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("WARN")).init();

    let client = match args.bind_addr {
        Some(addr) => UdpClient::bind(addr)?,
        None => UdpClient::new()?,
    };
    client.wake(&args.address, args.target.as_bytes(), &args.password)?;
    client.close();
    println!("magic packet sent to {} for {}", args.address, args.target);
    Ok(())
}
