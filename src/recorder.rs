//! Rate-limited multi-device sampling scheduler
//!
//! One background thread owns all bus I/O and all sink writes. The
//! controlling thread only issues start/stop/status/flush commands; the run
//! flag and the join on stop are the only cross-thread synchronization the
//! loop itself needs.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::csv_log::SampleLog;
use crate::error::{GyroError, Result};
use crate::ism330dhcx::{GyroDevice, Ism330Dhcx};
use crate::transport::{lock_unpoisoned, SharedBus};

/// Upper bound on one sleep slice, so `stop()` is observed promptly even at
/// low target frequencies.
const SLEEP_SLICE: Duration = Duration::from_millis(5);

/// Wait between passes while recording is disabled.
const IDLE_WAIT: Duration = Duration::from_millis(1);

/// Samples registered devices at a bounded rate and streams readings to
/// per-device CSV logs.
///
/// # Example
/// ```no_run
/// use ism330_gyro_logger::{
///     shared, GyroRecorder, NativeBus, ISM330DHCX_ADDRESS_HIGH, ISM330DHCX_ADDRESS_LOW,
/// };
///
/// let mut recorder = GyroRecorder::new(shared(NativeBus::new("/dev/i2c-16")))?;
/// recorder.add_device(ISM330DHCX_ADDRESS_LOW)?;
/// recorder.add_device(ISM330DHCX_ADDRESS_HIGH)?;
///
/// recorder.set_recording(true, 100);
/// recorder.start("gyro_logs")?;
/// std::thread::sleep(std::time::Duration::from_secs(10));
/// recorder.stop()?;
/// # Ok::<(), ism330_gyro_logger::GyroError>(())
/// ```
pub struct GyroRecorder {
    bus: SharedBus,
    devices: Vec<Arc<dyn GyroDevice>>,
    sinks: Vec<Arc<Mutex<SampleLog>>>,
    run: Arc<AtomicBool>,
    recording: Arc<AtomicBool>,
    frequency: Arc<AtomicU32>,
    worker: Option<thread::JoinHandle<()>>,
}

impl GyroRecorder {
    /// Open the bus transport and create an idle recorder.
    ///
    /// # Errors
    /// [`GyroError::TransportUnavailable`] when the bus resource cannot be
    /// claimed. There is no automatic retry.
    pub fn new(bus: SharedBus) -> Result<Self> {
        lock_unpoisoned(&bus).open()?;
        Ok(Self {
            bus,
            devices: Vec::new(),
            sinks: Vec::new(),
            run: Arc::new(AtomicBool::new(false)),
            recording: Arc::new(AtomicBool::new(false)),
            frequency: Arc::new(AtomicU32::new(0)),
            worker: None,
        })
    }

    /// Register an ISM330DHCX at `address` on the shared bus.
    ///
    /// The device is identity-checked and configured before it is admitted.
    /// On [`GyroError::InvalidDeviceId`] the device is not registered; the
    /// caller decides whether that is fatal.
    pub fn add_device(&mut self, address: u8) -> Result<()> {
        let device = Ism330Dhcx::new(Arc::clone(&self.bus), address);
        self.register_device(Arc::new(device))
    }

    /// Admit any device implementation through the verify-then-configure
    /// gate.
    pub fn register_device(&mut self, device: Arc<dyn GyroDevice>) -> Result<()> {
        device.verify_identity()?;
        device.configure()?;
        self.devices.push(device);
        Ok(())
    }

    /// Number of registered (verified) devices.
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Open one log per device under `folder` and spawn the polling thread.
    ///
    /// Returns immediately; polling proceeds concurrently. The device list
    /// is fixed for the duration of the loop.
    pub fn start<P: AsRef<Path>>(&mut self, folder: P) -> Result<()> {
        if self.worker.is_some() {
            return Err(GyroError::InvalidParameter(
                "recorder is already running".to_string(),
            ));
        }

        self.sinks.clear();
        for index in 0..self.devices.len() {
            let path = folder.as_ref().join(format!("sensor{index}.csv"));
            self.sinks.push(Arc::new(Mutex::new(SampleLog::open(path)?)));
        }

        self.run.store(true, Ordering::SeqCst);

        let devices = self.devices.clone();
        let sinks = self.sinks.clone();
        let run = Arc::clone(&self.run);
        let recording = Arc::clone(&self.recording);
        let frequency = Arc::clone(&self.frequency);

        self.worker = Some(
            thread::Builder::new()
                .name("gyro-poll".to_string())
                .spawn(move || poll_loop(&devices, &sinks, &run, &recording, &frequency))?,
        );
        Ok(())
    }

    /// Clear the run flag, join the polling thread, flush and close all
    /// sinks.
    ///
    /// Blocks until the loop has drained its current pass. Calling `stop`
    /// on an idle recorder is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        self.run.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.flush()?;
        self.sinks.clear();
        Ok(())
    }

    /// Enable or disable recording and set the shared target frequency.
    ///
    /// Takes effect on the next loop pass; changing the frequency never
    /// resets a device's rate-limit state.
    pub fn set_recording(&self, enabled: bool, frequency_hz: u32) {
        self.frequency.store(frequency_hz, Ordering::SeqCst);
        self.recording.store(enabled, Ordering::SeqCst);
    }

    /// False when no devices are registered or any registered device stops
    /// responding. Intended for periodic external health polling.
    pub fn status_check(&self) -> bool {
        if self.devices.is_empty() {
            return false;
        }
        self.devices.iter().all(|device| device.is_connected())
    }

    /// Flush every open sink. A no-op when nothing is pending.
    pub fn flush(&self) -> Result<()> {
        for sink in &self.sinks {
            lock_unpoisoned(sink).flush()?;
        }
        Ok(())
    }
}

impl Drop for GyroRecorder {
    fn drop(&mut self) {
        let _ = self.stop();
        lock_unpoisoned(&self.bus).close();
    }
}

fn epoch_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_micros() as u64)
        .unwrap_or(0)
}

/// The polling loop. Single thread; all bus I/O and sink writes happen
/// here.
///
/// A device fires only once enough time has elapsed that firing keeps its
/// instantaneous rate at or below the target. The throttle is committed
/// before the readiness check, so a not-ready device consumes its slot
/// instead of being retried in a busy spin. Throttle arithmetic uses the
/// monotonic clock; record timestamps use wall-clock epoch microseconds.
fn poll_loop(
    devices: &[Arc<dyn GyroDevice>],
    sinks: &[Arc<Mutex<SampleLog>>],
    run: &AtomicBool,
    recording: &AtomicBool,
    frequency: &AtomicU32,
) {
    // "Never fired" baselines make every device eligible on the first pass.
    let mut last_fires: Vec<Option<Instant>> = vec![None; devices.len()];

    while run.load(Ordering::SeqCst) {
        let target_hz = frequency.load(Ordering::SeqCst);
        if !recording.load(Ordering::SeqCst) || target_hz == 0 {
            thread::sleep(IDLE_WAIT);
            continue;
        }

        let period = Duration::from_secs_f64(1.0 / target_hz as f64);
        let now = Instant::now();
        let mut next_due = now + period;

        for (index, device) in devices.iter().enumerate() {
            if !run.load(Ordering::SeqCst) {
                break;
            }

            let due = match last_fires[index] {
                Some(last) => last + period,
                None => now,
            };
            if due > now {
                next_due = next_due.min(due);
                continue;
            }

            // Throttle commit: the slot is spent whether or not data is
            // ready.
            last_fires[index] = Some(now);

            if !device.is_data_ready() {
                continue;
            }
            let Ok(sample) = device.read_sample() else {
                // Transient read failure: skip this pass, no retry.
                continue;
            };

            let (x, y, z) = sample.to_mdps();
            let _ = lock_unpoisoned(&sinks[index]).append(epoch_micros(), x, y, z);
        }

        // Sleep until the earliest next-eligible fire, in bounded slices so
        // a cleared run flag is observed quickly.
        let wait = next_due
            .saturating_duration_since(Instant::now())
            .min(SLEEP_SLICE);
        if !wait.is_zero() {
            thread::sleep(wait);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ism330dhcx::GyroSample;
    use crate::transport::{shared, BusTransport, EMPTY_READ};
    use std::fs;
    use std::path::PathBuf;

    struct NullBus;

    impl BusTransport for NullBus {
        fn open(&mut self) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) {}
        fn begin_transaction(&mut self, _address: u8) {}
        fn queue_write(&mut self, _bytes: &[u8]) {}
        fn commit_write(&mut self) -> Result<()> {
            Ok(())
        }
        fn request_read(&mut self, _address: u8, _count: usize) -> usize {
            0
        }
        fn read_byte(&mut self) -> u8 {
            EMPTY_READ
        }
        fn available(&self) -> usize {
            0
        }
    }

    struct MockDevice {
        address: u8,
        identity_ok: bool,
        ready: AtomicBool,
        connected: AtomicBool,
        readiness_polls: AtomicU32,
        next_value: AtomicU32,
    }

    impl MockDevice {
        fn new(address: u8) -> Arc<Self> {
            Arc::new(Self {
                address,
                identity_ok: true,
                ready: AtomicBool::new(true),
                connected: AtomicBool::new(true),
                readiness_polls: AtomicU32::new(0),
                next_value: AtomicU32::new(0),
            })
        }

        fn with_bad_identity(address: u8) -> Arc<Self> {
            let mut device = Self::new(address);
            Arc::get_mut(&mut device).unwrap().identity_ok = false;
            device
        }
    }

    impl GyroDevice for MockDevice {
        fn address(&self) -> u8 {
            self.address
        }

        fn verify_identity(&self) -> Result<()> {
            if self.identity_ok {
                Ok(())
            } else {
                Err(GyroError::InvalidDeviceId {
                    address: self.address,
                    found: 0x00,
                })
            }
        }

        fn configure(&self) -> Result<()> {
            Ok(())
        }

        fn is_data_ready(&self) -> bool {
            self.readiness_polls.fetch_add(1, Ordering::SeqCst);
            self.ready.load(Ordering::SeqCst)
        }

        fn read_sample(&self) -> Result<GyroSample> {
            let value = self.next_value.fetch_add(1, Ordering::SeqCst) as i16;
            Ok(GyroSample {
                x: value,
                y: value,
                z: value,
            })
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
    }

    fn test_recorder() -> GyroRecorder {
        GyroRecorder::new(shared(NullBus)).unwrap()
    }

    fn temp_folder(tag: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("gyro_rec_{}_{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).unwrap();
        path
    }

    fn data_rows(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .skip(1) // header
            .map(str::to_owned)
            .collect()
    }

    fn timestamps(rows: &[String]) -> Vec<u64> {
        rows.iter()
            .map(|row| row.split(',').next().unwrap().parse().unwrap())
            .collect()
    }

    #[test]
    fn test_rate_limit_holds_for_two_always_ready_devices() {
        let folder = temp_folder("rate_limit");
        let mut recorder = test_recorder();
        recorder.register_device(MockDevice::new(0x6A)).unwrap();
        recorder.register_device(MockDevice::new(0x6B)).unwrap();

        recorder.set_recording(true, 100);
        recorder.start(&folder).unwrap();
        thread::sleep(Duration::from_secs(1));
        recorder.stop().unwrap();

        for index in 0..2 {
            let rows = data_rows(&folder.join(format!("sensor{index}.csv")));
            assert!(
                rows.len() <= 101,
                "sensor{} exceeded the 100 Hz bound: {} rows",
                index,
                rows.len()
            );
            assert!(
                rows.len() >= 50,
                "sensor{} sampled implausibly slowly: {} rows",
                index,
                rows.len()
            );

            let stamps = timestamps(&rows);
            assert!(
                stamps.windows(2).all(|pair| pair[0] < pair[1]),
                "sensor{index} timestamps are not strictly increasing"
            );
        }

        let _ = fs::remove_dir_all(&folder);
    }

    #[test]
    fn test_not_ready_device_does_not_block_ready_device() {
        let folder = temp_folder("independence");
        let stalled = MockDevice::new(0x6A);
        stalled.ready.store(false, Ordering::SeqCst);
        let healthy = MockDevice::new(0x6B);

        let mut recorder = test_recorder();
        recorder.register_device(stalled).unwrap();
        recorder.register_device(healthy).unwrap();

        recorder.set_recording(true, 200);
        recorder.start(&folder).unwrap();
        thread::sleep(Duration::from_millis(300));
        recorder.stop().unwrap();

        assert!(data_rows(&folder.join("sensor0.csv")).is_empty());
        assert!(data_rows(&folder.join("sensor1.csv")).len() >= 20);

        let _ = fs::remove_dir_all(&folder);
    }

    #[test]
    fn test_not_ready_device_still_consumes_its_rate_slot() {
        let folder = temp_folder("throttle_commit");
        let device = MockDevice::new(0x6A);
        device.ready.store(false, Ordering::SeqCst);

        let mut recorder = test_recorder();
        recorder.register_device(device.clone()).unwrap();

        recorder.set_recording(true, 100);
        recorder.start(&folder).unwrap();
        thread::sleep(Duration::from_millis(300));
        recorder.stop().unwrap();

        // Readiness polls are bounded by the target rate, not by the loop
        // speed; a busy retry would show thousands here.
        let polls = device.readiness_polls.load(Ordering::SeqCst);
        assert!(polls <= 60, "readiness polled {polls} times in 300 ms");
        assert!(polls >= 5, "loop barely ran: {polls} readiness polls");

        let _ = fs::remove_dir_all(&folder);
    }

    #[test]
    fn test_recording_disabled_produces_no_rows() {
        let folder = temp_folder("disabled");
        let mut recorder = test_recorder();
        recorder.register_device(MockDevice::new(0x6A)).unwrap();

        recorder.set_recording(false, 100);
        recorder.start(&folder).unwrap();
        thread::sleep(Duration::from_millis(200));

        recorder.flush().unwrap();
        assert!(data_rows(&folder.join("sensor0.csv")).is_empty());

        // Enabling takes effect without a restart.
        recorder.set_recording(true, 100);
        thread::sleep(Duration::from_millis(200));
        recorder.stop().unwrap();
        assert!(!data_rows(&folder.join("sensor0.csv")).is_empty());

        let _ = fs::remove_dir_all(&folder);
    }

    #[test]
    fn test_identity_mismatch_is_not_registered() {
        let mut recorder = test_recorder();
        let result = recorder.register_device(MockDevice::with_bad_identity(0x6A));

        assert!(matches!(
            result,
            Err(GyroError::InvalidDeviceId { address: 0x6A, .. })
        ));
        assert_eq!(recorder.device_count(), 0);
        assert!(!recorder.status_check());
    }

    #[test]
    fn test_status_check_reports_disconnected_device() {
        let device = MockDevice::new(0x6A);
        let mut recorder = test_recorder();
        recorder.register_device(device.clone()).unwrap();
        assert!(recorder.status_check());

        device.connected.store(false, Ordering::SeqCst);
        assert!(!recorder.status_check());
    }

    #[test]
    fn test_stop_twice_is_safe() {
        let folder = temp_folder("double_stop");
        let mut recorder = test_recorder();
        recorder.register_device(MockDevice::new(0x6A)).unwrap();

        recorder.set_recording(true, 100);
        recorder.start(&folder).unwrap();
        thread::sleep(Duration::from_millis(50));

        recorder.stop().unwrap();
        recorder.stop().unwrap();
        recorder.flush().unwrap();

        let _ = fs::remove_dir_all(&folder);
    }

    #[test]
    fn test_restart_appends_to_existing_logs() {
        let folder = temp_folder("restart");
        let mut recorder = test_recorder();
        recorder.register_device(MockDevice::new(0x6A)).unwrap();
        recorder.set_recording(true, 200);

        recorder.start(&folder).unwrap();
        thread::sleep(Duration::from_millis(150));
        recorder.stop().unwrap();
        let first_run = data_rows(&folder.join("sensor0.csv")).len();
        assert!(first_run > 0);

        recorder.start(&folder).unwrap();
        thread::sleep(Duration::from_millis(150));
        recorder.stop().unwrap();

        let rows = data_rows(&folder.join("sensor0.csv"));
        assert!(rows.len() > first_run);
        let contents = fs::read_to_string(folder.join("sensor0.csv")).unwrap();
        assert_eq!(contents.matches("time (us)").count(), 1);

        let _ = fs::remove_dir_all(&folder);
    }

    #[test]
    fn test_start_while_running_is_rejected() {
        let folder = temp_folder("double_start");
        let mut recorder = test_recorder();
        recorder.register_device(MockDevice::new(0x6A)).unwrap();

        recorder.start(&folder).unwrap();
        assert!(matches!(
            recorder.start(&folder),
            Err(GyroError::InvalidParameter(_))
        ));
        recorder.stop().unwrap();

        let _ = fs::remove_dir_all(&folder);
    }
}
