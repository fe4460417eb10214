//! Interactive operator shell against a simulated RentScan peripheral.
//!
//! Usage:
//!   cargo run -p rentscan --example mock_shell
//!
//! Besides the shell commands, `peer advertise`, `peer notify` and
//! `peer drop` act on the simulated peripheral.

use std::io::{self, BufRead, Write};

use rentscan::protocol::advert::build_adv_data;
use rentscan::shell;
use rentscan::transport::MockTransport;
use rentscan::{
    Address, AddressKind, Central, CentralConfig, Command, Handle, RentalMessage, RentalStatus,
    Result, TagId,
};

const PEER: Address = Address::new([0xc0, 0x11, 0x22, 0x33, 0x44, 0x55], AddressKind::Random);

fn main() -> Result<()> {
    env_logger::init();

    let config = CentralConfig::default();
    let adv = build_adv_data(Some(&config.device_name), &[config.uuids.service]);
    let mock = MockTransport::with_rentscan_layout().into_shared();
    let mut central = Central::builder()
        .with_transport(Box::new(mock.clone()))
        .with_config(config)
        .build()?
        .enable()?;

    let stdin = io::stdin();
    print!("rentscan> ");
    let _ = io::stdout().flush();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let reply = match line.trim() {
            "" => Ok(String::new()),
            "quit" | "exit" => break,
            "peer advertise" => {
                mock.lock().advertise(PEER, adv.clone(), true);
                Ok("advertising".to_string())
            }
            "peer notify" => match central.orchestrator().connection() {
                Some((conn, _)) => {
                    let msg = RentalMessage::new(Command::RentalStart, RentalStatus::Rented)
                        .with_tag(TagId::try_from(&[0x04, 0xa2, 0x2b][..])?)
                        .with_timing(1_700_000_000, 3600);
                    mock.lock().notify(conn, Handle::new(0x15), &msg.encode());
                    Ok("notified".to_string())
                }
                None => Ok("not connected".to_string()),
            },
            "peer drop" => match central.orchestrator().connection() {
                Some((conn, _)) => {
                    mock.lock().drop_link(conn, 0x08);
                    Ok("link dropped".to_string())
                }
                None => Ok("not connected".to_string()),
            },
            other => shell::run_line(&mut central, other),
        };
        match reply {
            Ok(text) if !text.is_empty() => println!("{}", text),
            Ok(_) => {}
            Err(e) => println!("error: {}", e),
        }
        match central.process_pending() {
            Ok(msgs) => {
                for m in msgs {
                    println!("<- {:?} tag {} ({} s)", m.cmd, m.tag_id.to_hex(), m.duration);
                }
            }
            Err(e) => println!("error: {}", e),
        }
        print!("rentscan> ");
        let _ = io::stdout().flush();
    }
    Ok(())
}
