//! Step detection
//!
//! Raw accelerometer samples are smoothed by a symmetric 27-tap low-pass
//! filter and decimated by eight. The norm of the filtered vector feeds a
//! [`StepSegmenter`], and every segment it reports advances the running
//! [`StepData`] counters.

use sensorhub_core::{NtPrecise, NtTime};

use crate::step_segmenter::{
    SegmentListener, SegmenterState, StepSegment, StepSegmentType, StepSegmenter,
};

/// Sample period the filter kernel was designed for (0.02 s)
pub const DESIGN_SAMPLE_PERIOD: NtTime = NtTime::from_bits(335_544);

const HALF_TAPS: usize = 13;
const FILTER_LEN: u32 = 2 * HALF_TAPS as u32 + 1;
const ACC_BUF_SIZE: usize = 32;
const ACC_BUF_MASK: usize = ACC_BUF_SIZE - 1;
const DECIMATION_MASK: u32 = 7;

/// Group delay of the filter, subtracted from output timestamps
pub const FILTER_DELAY: NtTime = NtTime::from_bits(335_544 * HALF_TAPS as i64);

/// Centre tap first, then the taps shared by each symmetric pair
const LOW_PASS_KERNEL: [f32; HALF_TAPS + 1] = [
    0.103_165_62,
    0.100_275_49,
    0.092_000_54,
    0.079_453,
    0.064_255_5,
    0.048_246_78,
    0.033_161_95,
    0.020_353_3,
    0.010_606_823,
    0.004_086_134,
    0.000_406_038_28,
    -0.001_190_791,
    -0.001_601_983_6,
    -0.001_635_591_8,
];

/// Low-pass and decimation stage ahead of the segmenter
pub struct StepSignalGenerator {
    count: u32,
    primed: bool,
    acc: [[f32; ACC_BUF_SIZE]; 3],
}

impl Default for StepSignalGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl StepSignalGenerator {
    pub const fn new() -> Self {
        Self {
            count: 0,
            primed: false,
            acc: [[0.0; ACC_BUF_SIZE]; 3],
        }
    }

    /// Restart filling the filter window
    pub fn reset(&mut self) {
        self.count = 0;
        self.primed = false;
    }

    /// Add one raw sample
    ///
    /// Returns the filtered norm and its delay-corrected timestamp on every
    /// eighth sample once the filter window is full.
    pub fn update(&mut self, acc: &[NtPrecise; 3], timestamp: NtTime) -> Option<(NtPrecise, NtTime)> {
        let slot = self.count as usize & ACC_BUF_MASK;
        for (axis, value) in self.acc.iter_mut().zip(acc) {
            axis[slot] = value.to_num::<f32>();
        }
        self.count = self.count.wrapping_add(1);
        if self.count > FILTER_LEN {
            self.primed = true;
        }

        if !self.primed || self.count & DECIMATION_MASK != DECIMATION_MASK {
            return None;
        }

        let sum_sq: f32 = self
            .acc
            .iter()
            .map(|axis| {
                let filtered = self.filter(axis);
                filtered * filtered
            })
            .sum();
        let norm = NtPrecise::saturating_from_num(libm::sqrtf(sum_sq));
        Some((norm, timestamp - FILTER_DELAY))
    }

    fn filter(&self, axis: &[f32; ACC_BUF_SIZE]) -> f32 {
        let back = |n: usize| axis[(self.count as usize).wrapping_sub(n + 1) & ACC_BUF_MASK];

        let mut out = LOW_PASS_KERNEL[0] * back(HALF_TAPS);
        for i in 0..HALF_TAPS {
            out += LOW_PASS_KERNEL[HALF_TAPS - i] * (back(i) + back(2 * HALF_TAPS - i));
        }
        out
    }
}

/// Running step counts, updated once per reported segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepData {
    pub start_time: NtTime,
    pub stop_time: NtTime,
    /// Steps per second since the current walk started
    pub step_frequency: NtPrecise,
    pub num_steps_total: u32,
    pub num_steps_since_walking: u32,
}

impl Default for StepData {
    fn default() -> Self {
        Self {
            start_time: NtTime::from_bits(-(1 << 24)),
            stop_time: NtTime::from_bits(-(1 << 24)),
            step_frequency: NtPrecise::ZERO,
            num_steps_total: 0,
            num_steps_since_walking: 0,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for StepData {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "StepData(total={=u32}, walk={=u32}, {=i64} -> {=i64})",
            self.num_steps_total,
            self.num_steps_since_walking,
            self.start_time.to_bits(),
            self.stop_time.to_bits()
        )
    }
}

/// Receiver of detected steps
pub trait StepListener {
    fn on_step(&mut self, step: &StepData);

    /// The segment behind the step just reported
    fn on_segment(&mut self, _segment: &StepSegment) {}
}

impl<F> StepListener for F
where
    F: FnMut(&StepData),
{
    fn on_step(&mut self, step: &StepData) {
        self(step)
    }
}

/// Turns segments into step counts on behalf of [`StepDetector`]
pub struct StepTracker<L> {
    step: StepData,
    start_walk_time: NtTime,
    listener: Option<L>,
}

impl<L> StepTracker<L> {
    fn new(listener: Option<L>) -> Self {
        Self {
            step: StepData::default(),
            start_walk_time: NtTime::ZERO,
            listener,
        }
    }
}

impl<L: StepListener> SegmentListener for StepTracker<L> {
    fn on_segment(&mut self, segment: &StepSegment) {
        if segment.kind == StepSegmentType::FirstStep {
            self.start_walk_time = segment.start_time;
            self.step.num_steps_since_walking = 0;
        }

        self.step.start_time = segment.start_time;
        self.step.stop_time = segment.stop_time;
        self.step.num_steps_total = self.step.num_steps_total.wrapping_add(1);
        self.step.num_steps_since_walking += 1;

        let walked = (segment.stop_time - self.start_walk_time).to_num::<f32>();
        self.step.step_frequency = if walked > 0.0 {
            NtPrecise::saturating_from_num(self.step.num_steps_since_walking as f32 / walked)
        } else {
            NtPrecise::ZERO
        };
        log::trace!(
            "step {} ({} this walk)",
            self.step.num_steps_total,
            self.step.num_steps_since_walking
        );

        if let Some(listener) = self.listener.as_mut() {
            listener.on_step(&self.step);
            listener.on_segment(segment);
        }
    }
}

/// Pedometer built from the signal generator and the segmenter
pub struct StepDetector<L> {
    generator: StepSignalGenerator,
    segmenter: StepSegmenter<StepTracker<L>>,
}

impl<L: StepListener> Default for StepDetector<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: StepListener> StepDetector<L> {
    /// Detector that only records steps; read them with
    /// [`latest_step`](Self::latest_step)
    pub fn new() -> Self {
        Self {
            generator: StepSignalGenerator::new(),
            segmenter: StepSegmenter::with_listener(StepTracker::new(None)),
        }
    }

    pub fn with_listener(listener: L) -> Self {
        let mut detector = Self::new();
        detector.init(listener);
        detector
    }

    /// Install the listener and zero every counter
    pub fn init(&mut self, listener: L) {
        self.segmenter.init(StepTracker::new(Some(listener)));
        self.reset();
    }

    /// Zero the step data and restart filtering and segmentation
    pub fn reset(&mut self) {
        if let Some(tracker) = self.segmenter.listener_mut() {
            tracker.step = StepData::default();
            tracker.start_walk_time = NtTime::ZERO;
        }
        self.generator.reset();
        self.segmenter.reset();
    }

    /// Reset and hand back the listener
    pub fn clean_up(&mut self) -> Option<L> {
        self.reset();
        self.segmenter
            .listener_mut()
            .and_then(|tracker| tracker.listener.take())
    }

    pub fn listener(&self) -> Option<&L> {
        self.segmenter
            .listener()
            .and_then(|tracker| tracker.listener.as_ref())
    }

    /// Feed one raw accelerometer sample
    pub fn update(&mut self, acc: &[NtPrecise; 3], timestamp: NtTime) {
        if let Some((norm, filtered_time)) = self.generator.update(acc, timestamp) {
            self.segmenter.update(norm, filtered_time);
        }
    }

    /// Feed a norm that was filtered upstream, bypassing the signal generator
    pub fn update_filtered(&mut self, acc_norm: NtPrecise, timestamp: NtTime) {
        self.segmenter.update(acc_norm, timestamp);
    }

    pub fn latest_step(&self) -> StepData {
        self.segmenter
            .listener()
            .map_or_else(StepData::default, |tracker| tracker.step)
    }

    pub fn walk_state(&self) -> SegmenterState {
        self.segmenter.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(x: f64, y: f64, z: f64) -> [NtPrecise; 3] {
        [
            NtPrecise::from_num(x),
            NtPrecise::from_num(y),
            NtPrecise::from_num(z),
        ]
    }

    #[test]
    fn test_kernel_has_unit_gain() {
        let gain = LOW_PASS_KERNEL[0] + 2.0 * LOW_PASS_KERNEL[1..].iter().sum::<f32>();
        assert!((gain - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_filter_delay_matches_taps() {
        let delay = FILTER_DELAY.to_num::<f64>();
        assert!((delay - 0.26).abs() < 1e-5);
    }

    #[test]
    fn test_generator_waits_then_decimates() {
        let mut generator = StepSignalGenerator::new();
        let outputs: heapless::Vec<u32, 8> = (1..=47u32)
            .filter_map(|n| {
                let t = NtTime::from_num(n);
                generator.update(&sample(3.0, 4.0, 0.0), t).map(|_| n)
            })
            .collect();
        assert_eq!(outputs.as_slice(), &[31, 39, 47]);
    }

    #[test]
    fn test_generator_output_is_norm_of_filtered_vector() {
        let mut generator = StepSignalGenerator::new();
        let mut last = None;
        for n in 0..31 {
            last = generator.update(&sample(3.0, 4.0, 0.0), NtTime::from_num(n));
        }
        let (norm, time) = last.unwrap();
        assert!((norm.to_num::<f64>() - 5.0).abs() < 1e-3);
        assert_eq!(time, NtTime::from_num(30) - FILTER_DELAY);
    }

    #[test]
    fn test_generator_reset_refills_window() {
        let mut generator = StepSignalGenerator::new();
        for n in 0..31 {
            generator.update(&sample(0.0, 0.0, 9.8), NtTime::from_num(n));
        }
        generator.reset();
        let produced = (0..30)
            .filter(|n| {
                generator
                    .update(&sample(0.0, 0.0, 9.8), NtTime::from_num(*n))
                    .is_some()
            })
            .count();
        assert_eq!(produced, 0);
    }

    #[test]
    fn test_tracker_restarts_walk_count_on_first_step() {
        let mut tracker = StepTracker::<fn(&StepData)>::new(None);
        let at = |s: f64| NtTime::from_num(s);
        let segments = [
            (0.0, 1.0, StepSegmentType::FirstStep),
            (1.0, 2.0, StepSegmentType::MidStep),
            (2.0, 4.0, StepSegmentType::LastStep),
            (10.0, 11.0, StepSegmentType::FirstStep),
        ];
        for (start, stop, kind) in segments {
            tracker.on_segment(&StepSegment {
                start_time: at(start),
                stop_time: at(stop),
                kind,
            });
        }
        assert_eq!(tracker.step.num_steps_total, 4);
        assert_eq!(tracker.step.num_steps_since_walking, 1);
        assert_eq!(tracker.step.start_time, at(10.0));
        assert_eq!(tracker.step.step_frequency, NtPrecise::ONE);
    }

    #[test]
    fn test_default_step_times_are_negative() {
        let step = StepData::default();
        assert_eq!(step.start_time, NtTime::from_num(-1));
        assert_eq!(step.stop_time, NtTime::from_num(-1));
        assert_eq!(step.num_steps_total, 0);
    }
}
