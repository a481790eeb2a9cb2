//! Batch manager: sensor registration, queue thresholds and host transfers

use sensorhub_core::{HubError, HubResult, SensorType, NANOS_PER_SECOND, NUM_SENSOR_TYPE};
use sensorhub_mem::{round_block_size, BlockPool, Buffer, PoolStats};
use sensorhub_packets::header::{SensorHeader, SENSOR_TYPE_MASK};
use sensorhub_packets::MAX_HIF_PACKET_SIZE;
use sensorhub_queue::{Queue, QueueEvent};

use crate::config::{
    BatchConfig, HIF_CONTROL_QUEUE_SIZE, HIF_NWKUP_SENSOR_DATA_QUEUE_SIZE,
    HIF_WKUP_SENSOR_DATA_QUEUE_SIZE,
};
use crate::onchange::OnChangeCache;
use crate::signals::{HubSignals, QueueClass};
use crate::state::{BatchState, BatchStateType};

/// Highest sampling rate a sensor may be registered with
pub const MAX_SAMPLING_FREQ_HZ: u64 = 1000;
pub const MAX_SAMPLING_PERIOD_NS: u64 = NANOS_PER_SECOND;
pub const DEFAULT_HIGH_THRESHOLD: usize = 1;

pub const QUEUE_LOW_THR: usize = 0;
pub const QUEUE_HIGH_THR: usize = 1;

/// Blocks shared by the wakeup and non-wakeup queues
pub const HIF_SENSOR_DATA_PACKET_POOL_SIZE: usize =
    HIF_NWKUP_SENSOR_DATA_QUEUE_SIZE + HIF_WKUP_SENSOR_DATA_QUEUE_SIZE;
pub const HIF_CONTROL_PACKET_POOL_SIZE: usize = HIF_CONTROL_QUEUE_SIZE;

const HIF_BLOCK_SIZE: usize = round_block_size(MAX_HIF_PACKET_SIZE);
const DATA_POOL_BYTES: usize = HIF_SENSOR_DATA_PACKET_POOL_SIZE * HIF_BLOCK_SIZE;
const CONTROL_POOL_BYTES: usize = HIF_CONTROL_PACKET_POOL_SIZE * HIF_BLOCK_SIZE;

/// Native sample periods of the sensor sources, in nanoseconds
pub const ACC_ACTUAL_SAMPLE_PERIOD: u64 = 10_000_000;
pub const MAG_ACTUAL_SAMPLE_PERIOD: u64 = 40_000_000;
pub const GYRO_ACTUAL_SAMPLE_PERIOD: u64 = 10_000_000;
pub const PRES_ACTUAL_SAMPLE_PERIOD: u64 = 100_000_000;
pub const GAME_ROTN_ACTUAL_SAMPLE_PERIOD: u64 = 10_000_000;
pub const GEOMAG_ACTUAL_SAMPLE_PERIOD: u64 = 40_000_000;
pub const ON_CHANGE_SAMPLE_PERIOD: u64 = 0;

/// How a sensor's samples are held until the host reads them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoType {
    Wakeup,
    NonWakeup,
    /// Non-wakeup, with the latest sample also kept in the on-change cache
    NonWakeupOnChange,
}

impl FifoType {
    pub const fn queue_class(self) -> QueueClass {
        match self {
            FifoType::Wakeup => QueueClass::Wakeup,
            FifoType::NonWakeup | FifoType::NonWakeupOnChange => QueueClass::NonWakeup,
        }
    }
}

#[derive(Clone, Copy)]
struct SensorRoute {
    fifo: Option<FifoType>,
    native_period_ns: u64,
}

const fn route(fifo: FifoType, native_period_ns: u64) -> SensorRoute {
    SensorRoute {
        fifo: Some(fifo),
        native_period_ns,
    }
}

use FifoType::{NonWakeup as NW, NonWakeupOnChange as NWOC, Wakeup as WK};

const SENSOR_FIFO_MAP: [SensorRoute; NUM_SENSOR_TYPE] = [
    SensorRoute {
        fifo: None,
        native_period_ns: ON_CHANGE_SAMPLE_PERIOD,
    }, // META_DATA
    route(NW, ACC_ACTUAL_SAMPLE_PERIOD),       // ACCELEROMETER
    route(NW, MAG_ACTUAL_SAMPLE_PERIOD),       // GEOMAGNETIC_FIELD
    route(NW, GYRO_ACTUAL_SAMPLE_PERIOD),      // ORIENTATION
    route(NW, GYRO_ACTUAL_SAMPLE_PERIOD),      // GYROSCOPE
    route(NW, ON_CHANGE_SAMPLE_PERIOD),        // LIGHT
    route(NW, PRES_ACTUAL_SAMPLE_PERIOD),      // PRESSURE
    route(NW, ON_CHANGE_SAMPLE_PERIOD),        // TEMPERATURE
    route(WK, ON_CHANGE_SAMPLE_PERIOD),        // PROXIMITY
    route(NW, ACC_ACTUAL_SAMPLE_PERIOD),       // GRAVITY
    route(NW, ACC_ACTUAL_SAMPLE_PERIOD),       // LINEAR_ACCELERATION
    route(NW, GYRO_ACTUAL_SAMPLE_PERIOD),      // ROTATION_VECTOR
    route(NW, ON_CHANGE_SAMPLE_PERIOD),        // RELATIVE_HUMIDITY
    route(NW, ON_CHANGE_SAMPLE_PERIOD),        // AMBIENT_TEMPERATURE
    route(NW, MAG_ACTUAL_SAMPLE_PERIOD),       // MAGNETIC_FIELD_UNCALIBRATED
    route(NW, GAME_ROTN_ACTUAL_SAMPLE_PERIOD), // GAME_ROTATION_VECTOR
    route(NW, GYRO_ACTUAL_SAMPLE_PERIOD),      // GYROSCOPE_UNCALIBRATED
    route(WK, ON_CHANGE_SAMPLE_PERIOD),        // SIGNIFICANT_MOTION
    route(NW, ON_CHANGE_SAMPLE_PERIOD),        // STEP_DETECTOR
    route(NWOC, ON_CHANGE_SAMPLE_PERIOD),      // STEP_COUNTER
    route(NW, GEOMAG_ACTUAL_SAMPLE_PERIOD),    // GEOMAGNETIC_ROTATION_VECTOR
    route(NW, ON_CHANGE_SAMPLE_PERIOD),        // DEBUG_TUNNEL
    route(NW, ACC_ACTUAL_SAMPLE_PERIOD),       // ACCELEROMETER_RAW
    route(NW, MAG_ACTUAL_SAMPLE_PERIOD),       // MAGNETIC_FIELD_RAW
    route(NW, GYRO_ACTUAL_SAMPLE_PERIOD),      // GYROSCOPE_RAW
    route(NW, ON_CHANGE_SAMPLE_PERIOD),        // LIGHT_UV
    route(NW, ON_CHANGE_SAMPLE_PERIOD),        // LIGHT_RGB
    route(NW, ON_CHANGE_SAMPLE_PERIOD),        // STEP
    route(NW, ACC_ACTUAL_SAMPLE_PERIOD),       // ACCELEROMETER_UNCALIBRATED
    route(NW, GYRO_ACTUAL_SAMPLE_PERIOD),      // PRIVATE_ORIENTATION
    route(NW, ON_CHANGE_SAMPLE_PERIOD),        // CONTEXT_DEVICE_MOTION
    route(NW, ON_CHANGE_SAMPLE_PERIOD),        // CONTEXT_CARRY
    route(NW, ON_CHANGE_SAMPLE_PERIOD),        // CONTEXT_POSTURE
    route(NW, ON_CHANGE_SAMPLE_PERIOD),        // CONTEXT_TRANSPORT
    route(NW, ON_CHANGE_SAMPLE_PERIOD),        // GESTURE_EVENT
    route(NW, ON_CHANGE_SAMPLE_PERIOD),        // HEART_RATE
    route(NW, ON_CHANGE_SAMPLE_PERIOD),        // SYSTEM_REAL_TIME_CLOCK
    route(NW, MAG_ACTUAL_SAMPLE_PERIOD),       // MAGNETIC_FIELD_ANOMALY
];

/// How `sensor` is queued, `None` for sensors that never produce data
pub fn sensor_fifo_type(sensor: SensorType) -> HubResult<Option<FifoType>> {
    let index = sensor.index().ok_or(HubError::SensorInvalidType)?;
    Ok(SENSOR_FIFO_MAP[index].fifo)
}

/// Native sample period of `sensor` in nanoseconds, 0 for on-change sensors
pub fn native_sample_period(sensor: SensorType) -> HubResult<u64> {
    let index = sensor.index().ok_or(HubError::SensorInvalidType)?;
    Ok(SENSOR_FIFO_MAP[index].native_period_ns)
}

#[derive(Debug, Clone, Copy)]
struct BatchSensorParam {
    actual_period_ns: u64,
    requested_period_ns: u64,
    report_latency_ns: Option<u64>,
    class: QueueClass,
    sample_count: u32,
    decimation: u32,
    registered: bool,
    enabled: bool,
}

impl BatchSensorParam {
    const fn unregistered(route: &SensorRoute) -> Self {
        let class = match route.fifo {
            Some(FifoType::Wakeup) => QueueClass::Wakeup,
            _ => QueueClass::NonWakeup,
        };
        Self {
            actual_period_ns: route.native_period_ns,
            requested_period_ns: NANOS_PER_SECOND / MAX_SAMPLING_FREQ_HZ,
            report_latency_ns: None,
            class,
            sample_count: 0,
            decimation: 1,
            registered: false,
            enabled: false,
        }
    }
}

/// Registration and enable status of one sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorBatchInfo {
    pub registered: bool,
    pub enabled: bool,
    pub requested_period_ns: u64,
    pub report_latency_ns: Option<u64>,
    pub decimation: u32,
}

/// Owner of the host-facing queues and their packet pools
///
/// Samples enter through [`BatchManager::sensor_data_enqueue`], control
/// responses through [`BatchManager::control_response_enqueue`], and the
/// host transport drains all of them with [`BatchManager::dequeue`].
pub struct BatchManager<'a> {
    config: BatchConfig,
    state: &'a BatchState,
    signals: &'a HubSignals<'a>,
    data_pool: BlockPool<DATA_POOL_BYTES>,
    control_pool: BlockPool<CONTROL_POOL_BYTES>,
    wakeup: Queue<'a, HIF_WKUP_SENSOR_DATA_QUEUE_SIZE>,
    nonwakeup: Queue<'a, HIF_NWKUP_SENSOR_DATA_QUEUE_SIZE>,
    control: Queue<'a, HIF_CONTROL_QUEUE_SIZE>,
    sensors: [BatchSensorParam; NUM_SENSOR_TYPE],
    batched: [u8; 2],
    onchange: OnChangeCache,
    current: Option<QueueClass>,
}

impl<'a> BatchManager<'a> {
    /// Format the pools, create the queues and wire their events to `signals`
    pub fn new(
        config: BatchConfig,
        state: &'a BatchState,
        signals: &'a HubSignals<'a>,
    ) -> HubResult<Self> {
        config.validate()?;

        let mut wakeup = Queue::create(config.wakeup_capacity, QUEUE_LOW_THR, QUEUE_HIGH_THR)?;
        let mut nonwakeup =
            Queue::create(config.nonwakeup_capacity, QUEUE_LOW_THR, QUEUE_HIGH_THR)?;
        let mut control = Queue::create(config.control_capacity, QUEUE_LOW_THR, QUEUE_HIGH_THR)?;

        for event in [QueueEvent::Empty, QueueEvent::HighThreshold] {
            wakeup.register_listener(event, signals, QueueClass::Wakeup.tag());
            nonwakeup.register_listener(event, signals, QueueClass::NonWakeup.tag());
            control.register_listener(event, signals, QueueClass::ControlResponse.tag());
        }

        let data_pool = BlockPool::new();
        data_pool.init(MAX_HIF_PACKET_SIZE)?;
        let control_pool = BlockPool::new();
        control_pool.init(MAX_HIF_PACKET_SIZE)?;

        let mut sensors = [BatchSensorParam::unregistered(&SENSOR_FIFO_MAP[0]); NUM_SENSOR_TYPE];
        for (param, route) in sensors.iter_mut().zip(SENSOR_FIFO_MAP.iter()) {
            *param = BatchSensorParam::unregistered(route);
        }

        Ok(Self {
            config,
            state,
            signals,
            data_pool,
            control_pool,
            wakeup,
            nonwakeup,
            control,
            sensors,
            batched: [0; 2],
            onchange: OnChangeCache::new(),
            current: None,
        })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn state(&self) -> &'a BatchState {
        self.state
    }

    /// Record batching parameters for a sensor
    ///
    /// The period is clamped between the sensor's native period and one
    /// second; samples are decimated to approach the requested rate.
    pub fn register(&mut self, sensor: SensorType, period_ns: u64, latency_ns: u64) -> HubResult<()> {
        let index = sensor.index().ok_or(HubError::SensorInvalidType)?;
        if period_ns == 0 || NANOS_PER_SECOND / period_ns > MAX_SAMPLING_FREQ_HZ {
            return Err(HubError::InvalidParameter);
        }

        let param = &mut self.sensors[index];
        if param.registered {
            return Err(HubError::SensorAlreadyRegistered);
        }

        let actual = param.actual_period_ns;
        let period = period_ns.clamp(actual, MAX_SAMPLING_PERIOD_NS.max(actual));
        let decimation = if actual == 0 {
            1
        } else {
            (period / actual).clamp(1, u32::MAX as u64) as u32
        };

        param.requested_period_ns = period;
        param.report_latency_ns = Some(latency_ns);
        param.decimation = decimation;
        param.registered = true;
        self.batched[param.class as usize] += 1;

        log::debug!(
            "register {} period={}ns latency={}ns decimation={}",
            sensor,
            period,
            latency_ns,
            decimation
        );
        Ok(())
    }

    /// Remove a sensor's batching parameters
    pub fn deregister(&mut self, sensor: SensorType) -> HubResult<()> {
        let index = sensor.index().ok_or(HubError::SensorInvalidType)?;
        let param = &mut self.sensors[index];
        if !param.registered {
            return Err(HubError::SensorNotRegistered);
        }

        param.report_latency_ns = None;
        param.requested_period_ns = NANOS_PER_SECOND / MAX_SAMPLING_FREQ_HZ;
        param.registered = false;
        let class = param.class as usize;
        self.batched[class] = self.batched[class].saturating_sub(1);
        Ok(())
    }

    /// Start batching a registered sensor
    pub fn enable(&mut self, sensor: SensorType) -> HubResult<()> {
        let index = sensor.index().ok_or(HubError::SensorInvalidType)?;
        if !self.sensors[index].registered {
            return Err(HubError::InvalidParameter);
        }

        if self.state.get()? == BatchStateType::Idle {
            self.state.set(BatchStateType::Active)?;
        }
        self.sensors[index].enabled = true;
        self.apply_high_threshold(self.sensors[index].class)
    }

    /// Stop batching a sensor that has already been deregistered
    ///
    /// Its queued and cached samples are dropped. Once no sensor of either
    /// class is batched the hub falls back to IDLE.
    pub fn disable(&mut self, sensor: SensorType) -> HubResult<()> {
        let index = sensor.index().ok_or(HubError::SensorInvalidType)?;
        if self.sensors[index].registered {
            return Err(HubError::InvalidParameter);
        }

        let param = &mut self.sensors[index];
        param.decimation = 1;
        param.sample_count = 0;
        param.enabled = false;
        let class = param.class;

        let result = self.apply_high_threshold(class);

        if SENSOR_FIFO_MAP[index].fifo == Some(FifoType::NonWakeupOnChange) {
            self.onchange.discard(sensor);
            self.signals.set_onchange_empty(self.onchange.is_empty());
        }

        let removed = self.purge(class, sensor);
        log::debug!("disable {}: {} queued packets dropped", sensor, removed);

        if self.batched.iter().all(|&n| n == 0) {
            self.state.set(BatchStateType::Idle)?;
        }
        result
    }

    pub fn is_sensor_enabled(&self, sensor: SensorType) -> HubResult<bool> {
        let index = sensor.index().ok_or(HubError::SensorInvalidType)?;
        Ok(self.sensors[index].enabled)
    }

    pub fn sensor_info(&self, sensor: SensorType) -> HubResult<SensorBatchInfo> {
        let index = sensor.index().ok_or(HubError::SensorInvalidType)?;
        let p = &self.sensors[index];
        Ok(SensorBatchInfo {
            registered: p.registered,
            enabled: p.enabled,
            requested_period_ns: p.requested_period_ns,
            report_latency_ns: p.report_latency_ns,
            decimation: p.decimation,
        })
    }

    /// Queue class carrying `sensor`'s samples
    pub fn sensor_queue_class(&self, sensor: SensorType) -> HubResult<QueueClass> {
        let index = sensor.index().ok_or(HubError::SensorInvalidType)?;
        Ok(self.sensors[index].class)
    }

    /// Number of sensors registered on a data queue class
    pub fn batched_count(&self, class: QueueClass) -> usize {
        match class {
            QueueClass::ControlResponse => 0,
            _ => self.batched[class as usize] as usize,
        }
    }

    /// Queue a formatted sensor packet (or flush-complete marker)
    ///
    /// A full non-wakeup queue evicts its oldest packet while the host is
    /// suspended; otherwise a full queue wakes the host and the new packet
    /// is dropped with `QueueFull`.
    pub fn sensor_data_enqueue(&mut self, packet: &[u8], sensor: SensorType) -> HubResult<()> {
        let index = sensor.index().ok_or(HubError::SensorInvalidType)?;
        let fifo = SENSOR_FIFO_MAP[index].fifo.ok_or(HubError::InvalidParameter)?;
        let flush = SensorHeader::decode(packet)
            .ok_or(HubError::InvalidParameter)?
            .flush;

        if !flush {
            let param = &mut self.sensors[index];
            let count = param.sample_count;
            param.sample_count = count.wrapping_add(1);
            if count % param.decimation.max(1) != 0 {
                return Ok(());
            }
        }

        let buffer = self.data_pool.alloc_buffer(packet)?;
        let queued = match fifo {
            FifoType::Wakeup => self.enqueue_or_flush(QueueClass::Wakeup, buffer),
            FifoType::NonWakeup | FifoType::NonWakeupOnChange => {
                let suspended = self.state.get() == Ok(BatchStateType::ActiveHostSuspend);
                match self.nonwakeup.enqueue(buffer) {
                    Ok(_) => Ok(()),
                    Err(buffer) if suspended => self.evict_oldest_and_enqueue(buffer),
                    Err(buffer) => self.drop_and_flush(QueueClass::NonWakeup, buffer),
                }
            }
        };

        if fifo == FifoType::NonWakeupOnChange && !flush {
            let cached = self.onchange.upsert(sensor, packet);
            self.signals.set_onchange_empty(self.onchange.is_empty());
            queued.and(cached)
        } else {
            queued
        }
    }

    /// Queue a formatted control response
    pub fn control_response_enqueue(&mut self, packet: &[u8]) -> HubResult<()> {
        let buffer = self.control_pool.alloc_buffer(packet)?;
        match self.control.enqueue(buffer) {
            Ok(_) => Ok(()),
            Err(buffer) => {
                self.control_pool.free_buffer(buffer)?;
                log::warn!("control response dropped, queue full");
                self.queue_flush(QueueClass::ControlResponse);
                Err(HubError::QueueFull)
            }
        }
    }

    /// Copy pending packets into `out` for one host read
    ///
    /// Queues are drained by priority, packets are copied while a maximum
    /// size packet still fits, and a control response is always sent alone.
    /// Returns the number of bytes written, or `QueueEmpty` when nothing
    /// was pending.
    pub fn dequeue(&mut self, out: &mut [u8]) -> HubResult<usize> {
        if out.len() < MAX_HIF_PACKET_SIZE {
            return Err(HubError::BufferTooSmall);
        }

        let mut len = 0;
        while let Some(class) = self.signals.pending_class() {
            self.current = Some(class);
            let copied = match class {
                QueueClass::ControlResponse => {
                    Self::take(&self.control, &self.control_pool, &mut out[len..])?
                }
                QueueClass::Wakeup => {
                    Self::take(&self.wakeup, &self.data_pool, &mut out[len..])?
                }
                QueueClass::NonWakeup => self.take_nonwakeup(&mut out[len..])?,
            };
            if copied == 0 {
                // flushed while already empty
                self.signals.on_empty(class);
                continue;
            }
            len += copied;

            if class == QueueClass::ControlResponse || out.len() - len < MAX_HIF_PACKET_SIZE {
                break;
            }
        }

        if len == 0 {
            Err(HubError::QueueEmpty)
        } else {
            Ok(len)
        }
    }

    /// Wake the host for `class` as if its high threshold had been reached
    pub fn queue_flush(&self, class: QueueClass) {
        self.signals.on_high_threshold(class);
    }

    /// Queue the next host read will drain first
    pub fn pending_cause(&self) -> Option<QueueClass> {
        self.signals.pending_class()
    }

    /// Class chosen by the most recent dequeue step
    pub fn last_class(&self) -> Option<QueueClass> {
        self.current
    }

    /// Total packets the two data queues can hold
    pub fn max_queue_count(&self) -> usize {
        self.wakeup.capacity() + self.nonwakeup.capacity()
    }

    pub fn queue_len(&self, class: QueueClass) -> usize {
        match class {
            QueueClass::Wakeup => self.wakeup.len(),
            QueueClass::NonWakeup => self.nonwakeup.len(),
            QueueClass::ControlResponse => self.control.len(),
        }
    }

    pub fn high_threshold(&self, class: QueueClass) -> usize {
        match class {
            QueueClass::Wakeup => self.wakeup.high_threshold(),
            QueueClass::NonWakeup => self.nonwakeup.high_threshold(),
            QueueClass::ControlResponse => self.control.high_threshold(),
        }
    }

    pub fn data_pool_stats(&self) -> PoolStats {
        self.data_pool.stats()
    }

    pub fn control_pool_stats(&self) -> PoolStats {
        self.control_pool.stats()
    }

    pub fn onchange_cache(&self) -> &OnChangeCache {
        &self.onchange
    }

    /// Threshold for a data queue from the smallest report latency
    ///
    /// Each enabled streaming sensor contributes the samples it produces
    /// within that latency; the sum is kept between 1 and the tolerated
    /// share of the capacity.
    fn compute_high_threshold(&self, class: QueueClass) -> usize {
        let capacity = match class {
            QueueClass::Wakeup => self.wakeup.capacity(),
            QueueClass::NonWakeup => self.nonwakeup.capacity(),
            QueueClass::ControlResponse => return QUEUE_HIGH_THR,
        };
        let limit = (capacity * self.config.host_wakeup_tolerance_percent as usize / 100)
            .min(capacity - 1)
            .max(DEFAULT_HIGH_THRESHOLD);

        let min_latency = self
            .sensors
            .iter()
            .filter(|p| p.class == class)
            .filter_map(|p| p.report_latency_ns)
            .min();
        let mrl = match min_latency {
            None | Some(0) => return DEFAULT_HIGH_THRESHOLD,
            Some(mrl) => mrl,
        };

        let samples = self
            .sensors
            .iter()
            .filter(|p| p.class == class && p.enabled && p.actual_period_ns != ON_CHANGE_SAMPLE_PERIOD)
            .map(|p| mrl / (p.actual_period_ns * p.decimation.max(1) as u64))
            .fold(0u64, u64::saturating_add);

        (samples.min(limit as u64) as usize).max(DEFAULT_HIGH_THRESHOLD)
    }

    fn apply_high_threshold(&self, class: QueueClass) -> HubResult<()> {
        let threshold = self.compute_high_threshold(class);
        log::debug!("{:?} queue high threshold {}", class, threshold);
        match class {
            QueueClass::Wakeup => self.wakeup.set_high_threshold(threshold),
            QueueClass::NonWakeup => self.nonwakeup.set_high_threshold(threshold),
            QueueClass::ControlResponse => self.control.set_high_threshold(threshold),
        }
    }

    fn enqueue_or_flush(&self, class: QueueClass, buffer: Buffer) -> HubResult<()> {
        let rejected = match class {
            QueueClass::Wakeup => self.wakeup.enqueue(buffer),
            QueueClass::NonWakeup => self.nonwakeup.enqueue(buffer),
            QueueClass::ControlResponse => return Err(HubError::InvalidParameter),
        };
        match rejected {
            Ok(_) => Ok(()),
            Err(buffer) => self.drop_and_flush(class, buffer),
        }
    }

    fn drop_and_flush(&self, class: QueueClass, buffer: Buffer) -> HubResult<()> {
        self.data_pool.free_buffer(buffer)?;
        log::warn!("{:?} queue full, sample dropped", class);
        self.queue_flush(class);
        Err(HubError::QueueFull)
    }

    /// Most-recent-wins while the host sleeps
    fn evict_oldest_and_enqueue(&self, buffer: Buffer) -> HubResult<()> {
        if let Ok((oldest, _)) = self.nonwakeup.dequeue() {
            self.data_pool.free_buffer(oldest)?;
            log::trace!("host suspended, oldest non-wakeup packet evicted");
        }
        match self.nonwakeup.enqueue(buffer) {
            Ok(_) => Ok(()),
            Err(buffer) => {
                self.data_pool.free_buffer(buffer)?;
                Err(HubError::QueueFull)
            }
        }
    }

    /// Drop every queued packet of `sensor`, keeping the others in order
    fn purge(&self, class: QueueClass, sensor: SensorType) -> usize {
        let wire_id = sensor.wire_id() & SENSOR_TYPE_MASK;
        let pool = &self.data_pool;
        let keep = |buffer: &Buffer| {
            pool.with_block(buffer.block(), |bytes| bytes[1] & SENSOR_TYPE_MASK)
                .map_or(true, |id| id != wire_id)
        };
        let discard = |buffer: Buffer| {
            if pool.free_buffer(buffer).is_err() {
                log::warn!("purged buffer not from the data pool");
            }
        };
        match class {
            QueueClass::Wakeup => self.wakeup.retain(keep, discard),
            QueueClass::NonWakeup => self.nonwakeup.retain(keep, discard),
            QueueClass::ControlResponse => 0,
        }
    }

    fn take<const N: usize, const BYTES: usize>(
        queue: &Queue<'a, N>,
        pool: &BlockPool<BYTES>,
        out: &mut [u8],
    ) -> HubResult<usize> {
        match queue.dequeue() {
            Ok((buffer, _)) => {
                let len = pool.read_buffer(&buffer, out)?;
                pool.free_buffer(buffer)?;
                Ok(len)
            }
            Err(HubError::QueueEmpty) => Ok(0),
            Err(err) => Err(err),
        }
    }

    /// Non-wakeup queue first, then one pass over the on-change cache
    fn take_nonwakeup(&mut self, out: &mut [u8]) -> HubResult<usize> {
        match self.nonwakeup.dequeue() {
            Ok((buffer, _)) => {
                let len = self.data_pool.read_buffer(&buffer, out)?;
                self.data_pool.free_buffer(buffer)?;
                Ok(len)
            }
            Err(HubError::QueueEmpty) => {
                let replayed = match self.onchange.next_replay() {
                    Some(packet) => {
                        out[..packet.len()].copy_from_slice(packet);
                        packet.len()
                    }
                    None => 0,
                };
                if replayed == 0 {
                    self.signals.set_onchange_empty(true);
                    self.signals.on_empty(QueueClass::NonWakeup);
                }
                Ok(replayed)
            }
            Err(err) => Err(err),
        }
    }
}
