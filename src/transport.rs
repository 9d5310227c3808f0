use std::io::{self, BufRead};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Instant;

use log::{error, info, warn};

use crate::input::parse_line;
use crate::plugin::Plugin;
use crate::store::MemoryStore;

/// What the hub asks of the poller between heartbeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    DeviceModified { unit: u8, description: String },
    Command { unit: u8, command: String, level: u8 },
    DeviceRemoved { unit: u8 },
    ListDevices,
    Terminate,
}

/// Reads console lines on a separate thread and forwards parsed events.
/// The thread ends on EOF, which closes the channel.
pub fn spawn_console_reader(event_tx: Sender<HostEvent>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match parse_line(&line) {
                Ok(Some(event)) => {
                    let terminate = event == HostEvent::Terminate;
                    if event_tx.send(event).is_err() || terminate {
                        break;
                    }
                }
                Ok(None) => {}
                Err(err) => error!("{err:#}"),
            }
        }
    })
}

/// Drives the plugin like the hub does: a heartbeat whenever the interval
/// elapses, and console events in between.
pub fn run_host_loop(plugin: &mut Plugin<MemoryStore>, event_rx: &Receiver<HostEvent>) {
    let mut console_open = true;
    let mut next_tick = Instant::now() + plugin.heartbeat();
    loop {
        let now = Instant::now();
        if now >= next_tick {
            plugin.on_heartbeat();
            next_tick = Instant::now() + plugin.heartbeat();
            continue;
        }
        let wait = next_tick - now;

        if !console_open {
            thread::sleep(wait);
            continue;
        }

        match event_rx.recv_timeout(wait) {
            Ok(HostEvent::DeviceModified { unit, description }) => {
                if let Err(err) = plugin.store_mut().set_description(unit, &description) {
                    error!("{err:#}");
                    continue;
                }
                plugin.on_device_modified(unit);
            }
            Ok(HostEvent::Command {
                unit,
                command,
                level,
            }) => plugin.on_command(unit, &command, level),
            Ok(HostEvent::DeviceRemoved { unit }) => match plugin.store_mut().remove(unit) {
                Some(device) => info!("Deleted device Unit={unit} {}", device.name),
                None => warn!("No device with Unit={unit} to delete"),
            },
            Ok(HostEvent::ListDevices) => list_devices(plugin),
            Ok(HostEvent::Terminate) => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!("Console closed, polling continues");
                console_open = false;
            }
        }
    }
}

fn list_devices(plugin: &Plugin<MemoryStore>) {
    let store = plugin.store();
    info!(
        "Polling meters {:?}, {} devices, {} device writes",
        plugin.meters(),
        store.devices().count(),
        store.writes()
    );
    for device in store.devices() {
        info!(
            "Unit={:>3} {:<26} {}/{}/{} img={}{} {:<20} [{}] {:?}",
            device.unit,
            device.name,
            device.kind.type_id,
            device.kind.subtype,
            device.kind.switch_type,
            device.image,
            if device.used { "" } else { " (unused)" },
            device.s_value,
            device.description,
            device.options
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, mpsc};
    use std::thread;
    use std::time::{Duration, Instant};

    use color_eyre::eyre;

    use super::{HostEvent, run_host_loop};
    use crate::backend::{Backend, MeterCommand};
    use crate::constants::{COUNTER_BLOCK_COUNT, ENERGY_BLOCK_COUNT, PHASE_BLOCK_COUNT};
    use crate::data::{MeterReading, RegisterBlocks};
    use crate::plugin::{Plugin, PluginConfig};
    use crate::store::{DeviceStore, MemoryStore};

    struct CountingBackend {
        polls: Arc<AtomicUsize>,
        writes: Arc<AtomicUsize>,
        answer: bool,
    }

    impl Backend for CountingBackend {
        fn poll_meter(&mut self, slave: u8) -> eyre::Result<MeterReading> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if !self.answer {
                return Err(eyre::eyre!("no response from slave {slave}"));
            }
            let blocks = RegisterBlocks {
                energy: vec![0; usize::from(ENERGY_BLOCK_COUNT)],
                counters: vec![0; usize::from(COUNTER_BLOCK_COUNT)],
                phases: vec![0; usize::from(PHASE_BLOCK_COUNT)],
            };
            MeterReading::from_blocks(&blocks).ok_or_else(|| eyre::eyre!("short read"))
        }

        fn apply_command(&mut self, _slave: u8, _command: &MeterCommand) -> eyre::Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Started {
        plugin: Plugin<MemoryStore>,
        polls: Arc<AtomicUsize>,
        writes: Arc<AtomicUsize>,
    }

    fn started_plugin(poll_interval: Duration, answer: bool) -> Started {
        let polls = Arc::new(AtomicUsize::new(0));
        let writes = Arc::new(AtomicUsize::new(0));
        let backend = Box::new(CountingBackend {
            polls: Arc::clone(&polls),
            writes: Arc::clone(&writes),
            answer,
        });
        let config = PluginConfig {
            poll_interval,
            meters: "2".to_owned(),
            language: "en".to_owned(),
            baud_code: 1,
            read_only: false,
        };
        let mut plugin = Plugin::new(config, backend, MemoryStore::default());
        plugin.on_start().expect("start should succeed");
        Started {
            plugin,
            polls,
            writes,
        }
    }

    #[test]
    fn description_event_reaches_plugin_before_terminate() {
        let Started {
            mut plugin, writes, ..
        } = started_plugin(Duration::from_secs(60), false);
        let (event_tx, event_rx) = mpsc::channel();
        event_tx
            .send(HostEvent::DeviceModified {
                unit: 16,
                description: "ADDR=12".to_owned(),
            })
            .expect("send");
        event_tx.send(HostEvent::Terminate).expect("send");

        run_host_loop(&mut plugin, &event_rx);
        assert_eq!(writes.load(Ordering::SeqCst), 1);
        assert_eq!(plugin.meters(), &[12]);
        let description = plugin.store().device(16).map(|d| d.description.clone());
        assert_eq!(
            description.as_deref(),
            Some("Meter Addr=12, Power Factor, ADDR=12")
        );
    }

    #[test]
    fn timeouts_drive_heartbeats() {
        let Started {
            mut plugin, polls, ..
        } = started_plugin(Duration::from_millis(5), false);
        let (event_tx, event_rx) = mpsc::channel();
        let sender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            event_tx.send(HostEvent::Terminate).ok();
        });

        run_host_loop(&mut plugin, &event_rx);
        sender.join().expect("sender thread");
        assert!(polls.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn frequent_events_do_not_starve_heartbeats() {
        let Started {
            mut plugin, polls, ..
        } = started_plugin(Duration::from_millis(40), true);
        let (event_tx, event_rx) = mpsc::channel();
        let sender = thread::spawn(move || {
            let until = Instant::now() + Duration::from_millis(300);
            while Instant::now() < until {
                if event_tx.send(HostEvent::ListDevices).is_err() {
                    return;
                }
                thread::sleep(Duration::from_millis(5));
            }
            event_tx.send(HostEvent::Terminate).ok();
        });

        run_host_loop(&mut plugin, &event_rx);
        sender.join().expect("sender thread");
        assert!(polls.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn polling_continues_after_console_closes() {
        let Started {
            mut plugin, polls, ..
        } = started_plugin(Duration::from_millis(5), true);
        let (event_tx, event_rx) = mpsc::channel::<HostEvent>();
        drop(event_tx);

        // The loop never returns once the console is gone, so it is left running.
        thread::spawn(move || run_host_loop(&mut plugin, &event_rx));

        let deadline = Instant::now() + Duration::from_secs(5);
        while polls.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(polls.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn delete_event_removes_device() {
        let Started { mut plugin, .. } = started_plugin(Duration::from_secs(60), false);
        let (event_tx, event_rx) = mpsc::channel();
        event_tx
            .send(HostEvent::DeviceRemoved { unit: 20 })
            .expect("send");
        event_tx.send(HostEvent::Terminate).expect("send");

        run_host_loop(&mut plugin, &event_rx);
        assert!(plugin.store().device(20).is_none());
        assert!(plugin.store().device(16).is_some());
    }

    #[test]
    fn editing_missing_unit_is_skipped() {
        let Started {
            mut plugin, writes, ..
        } = started_plugin(Duration::from_secs(60), false);
        let (event_tx, event_rx) = mpsc::channel();
        event_tx
            .send(HostEvent::DeviceModified {
                unit: 99,
                description: "ADDR=12".to_owned(),
            })
            .expect("send");
        event_tx.send(HostEvent::Terminate).expect("send");

        run_host_loop(&mut plugin, &event_rx);
        assert_eq!(writes.load(Ordering::SeqCst), 0);
    }
}
