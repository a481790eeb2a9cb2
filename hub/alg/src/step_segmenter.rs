//! Step segmentation
//!
//! A lag-1 peak detector runs over the accelerometer norm. Every positive
//! peak is scored against the walking cadence seen so far and may close a
//! step. The first [`NUM_STEPS_BEFORE_REPORTING`] steps of a walk are held
//! back so that a single stumble is never reported; once the walk is
//! confirmed they are released together with the step that confirmed it.

use heapless::Vec;
use sensorhub_core::{NtPrecise, NtTime};

/// Peak height over the last valley needed to count as a step while walking (1.1 m/s²)
pub const MIN_PEAK_ACC: NtPrecise = NtPrecise::from_bits(18_454_937);

/// Relaxed peak height for the first step of a walk (0.5 m/s²)
pub const MIN_PEAK_ACC_INITIAL: NtPrecise = NtPrecise::from_bits(8_388_608);

/// Stride period assumed until a walk has been established (1.8 s)
pub const DEFAULT_EXPECTED_STRIDE_PERIOD: NtTime = NtTime::from_bits(30_198_988);

/// Longest gap between positive peaks that still continues a stride (2.5 s)
pub const MAX_STRIDE_TIME: NtTime = NtTime::from_bits(41_943_040);

/// Longest step; a longer pause ends the walk (1.3 s)
pub const MAX_STEP_TIME: NtTime = NtTime::from_bits(21_810_380);

/// Steps held back before a walk is reported
pub const NUM_STEPS_BEFORE_REPORTING: usize = 3;

/// Right-hand peak share that the left/right height difference may not exceed
const PEAK_SYMMETRY_RATIO: NtPrecise = NtPrecise::from_bits(12_582_912);

/// Position of a segment within a walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSegmentType {
    FirstStep,
    MidStep,
    LastStep,
}

/// One step, from the previous step boundary to this one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepSegment {
    pub start_time: NtTime,
    pub stop_time: NtTime,
    pub kind: StepSegmentType,
}

impl StepSegment {
    pub fn duration(&self) -> NtTime {
        self.stop_time - self.start_time
    }
}

impl Default for StepSegment {
    fn default() -> Self {
        Self {
            start_time: NtTime::ZERO,
            stop_time: NtTime::ZERO,
            kind: StepSegmentType::LastStep,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for StepSegment {
    fn format(&self, fmt: defmt::Formatter) {
        let kind = match self.kind {
            StepSegmentType::FirstStep => "first",
            StepSegmentType::MidStep => "mid",
            StepSegmentType::LastStep => "last",
        };
        defmt::write!(
            fmt,
            "StepSegment({=str}, {=i64} -> {=i64})",
            kind,
            self.start_time.to_bits(),
            self.stop_time.to_bits()
        )
    }
}

/// Walking state of the segmenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// Not walking
    EndWalk,
    /// Collecting the first steps of a walk
    StartWalk,
    /// Walk confirmed, every step is reported
    MidWalk,
}

/// Receiver of reported step segments
pub trait SegmentListener {
    fn on_segment(&mut self, segment: &StepSegment);
}

impl<F> SegmentListener for F
where
    F: FnMut(&StepSegment),
{
    fn on_segment(&mut self, segment: &StepSegment) {
        self(segment)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extremum {
    PositivePeak,
    NegativePeak,
    PotentialPositive,
    PotentialNegative,
}

/// Properties of the positive peak under evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PeakFlags(u8);

impl PeakFlags {
    const PEAK_PERIOD_SHORT_ENOUGH: u8 = 1 << 0;
    const STEP_PERIOD_SHORT_ENOUGH: u8 = 1 << 1;
    const MAG_LARGE_ENOUGH: u8 = 1 << 2;
    const STRIDE_PERIOD_NEAR_EXPECTED: u8 = 1 << 3;
    const CONSECUTIVE_LARGE_ENOUGH_PEAKS: u8 = 1 << 5;
    const VALID_NEG_PEAK_SINCE_LAST_STEP: u8 = 1 << 6;

    fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    fn contains(self, flag: u8) -> bool {
        self.0 & flag != 0
    }
}

fn half(t: NtTime) -> NtTime {
    NtTime::from_bits(t.to_bits() >> 1)
}

fn quarter(t: NtTime) -> NtTime {
    NtTime::from_bits(t.to_bits() >> 2)
}

/// Decide whether a scored positive peak closes a step
fn peak_meets_step_criteria(flags: PeakFlags) -> bool {
    if !flags.contains(PeakFlags::PEAK_PERIOD_SHORT_ENOUGH) {
        return false;
    }
    if flags.contains(PeakFlags::MAG_LARGE_ENOUGH) {
        return true;
    }
    if !flags.contains(PeakFlags::VALID_NEG_PEAK_SINCE_LAST_STEP) {
        return false;
    }
    // weaker peak, but in cadence after a strong one
    flags.contains(PeakFlags::CONSECUTIVE_LARGE_ENOUGH_PEAKS)
        && flags.contains(PeakFlags::STRIDE_PERIOD_NEAR_EXPECTED)
}

/// Step boundary detector over an accelerometer-norm stream
pub struct StepSegmenter<L> {
    listener: Option<L>,
    state: SegmenterState,
    segment: StepSegment,
    stored: Vec<StepSegment, NUM_STEPS_BEFORE_REPORTING>,

    last_pos_peak_mag: NtPrecise,
    last_neg_peak_mag: NtPrecise,
    last_step_peak_mag: NtPrecise,
    last_pos_peak_time: NtTime,
    last_neg_peak_time: NtTime,
    expected_stride_period: NtTime,

    prev_acc_norm: NtPrecise,
    prev_time: NtTime,
    prev_extremum: Extremum,

    peak_flags: PeakFlags,
    /// Last accepted step had a large enough peak
    step_mag_valid: bool,
}

impl<L: SegmentListener> Default for StepSegmenter<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: SegmentListener> StepSegmenter<L> {
    /// Segmenter without a listener; segments are only visible through
    /// [`latest_segment`](Self::latest_segment) until [`init`](Self::init)
    pub fn new() -> Self {
        Self {
            listener: None,
            state: SegmenterState::EndWalk,
            segment: StepSegment::default(),
            stored: Vec::new(),
            last_pos_peak_mag: NtPrecise::ZERO,
            last_neg_peak_mag: NtPrecise::ZERO,
            last_step_peak_mag: NtPrecise::ZERO,
            last_pos_peak_time: NtTime::ZERO,
            last_neg_peak_time: NtTime::ZERO,
            expected_stride_period: DEFAULT_EXPECTED_STRIDE_PERIOD,
            prev_acc_norm: NtPrecise::ZERO,
            prev_time: NtTime::ZERO,
            prev_extremum: Extremum::NegativePeak,
            peak_flags: PeakFlags::default(),
            step_mag_valid: false,
        }
    }

    pub fn with_listener(listener: L) -> Self {
        let mut segmenter = Self::new();
        segmenter.init(listener);
        segmenter
    }

    /// Install the listener and start from a clean state
    pub fn init(&mut self, listener: L) {
        self.listener = Some(listener);
        self.reset();
    }

    /// Forget all walking history, keeping the listener
    pub fn reset(&mut self) {
        self.segment = StepSegment::default();
        self.stored.clear();

        self.prev_acc_norm = NtPrecise::ZERO;
        self.prev_time = NtTime::ZERO;
        self.prev_extremum = Extremum::NegativePeak;

        self.last_pos_peak_mag = NtPrecise::ZERO;
        self.last_neg_peak_mag = NtPrecise::ZERO;
        self.last_step_peak_mag = NtPrecise::ZERO;
        self.last_pos_peak_time = NtTime::ZERO;
        self.last_neg_peak_time = NtTime::ZERO;
        self.expected_stride_period = DEFAULT_EXPECTED_STRIDE_PERIOD;

        self.state = SegmenterState::EndWalk;
        self.peak_flags = PeakFlags::default();
        self.step_mag_valid = false;
    }

    /// Reset and hand back the listener
    pub fn clean_up(&mut self) -> Option<L> {
        self.reset();
        self.listener.take()
    }

    pub fn listener(&self) -> Option<&L> {
        self.listener.as_ref()
    }

    pub fn listener_mut(&mut self) -> Option<&mut L> {
        self.listener.as_mut()
    }

    pub fn state(&self) -> SegmenterState {
        self.state
    }

    pub fn expected_stride_period(&self) -> NtTime {
        self.expected_stride_period
    }

    /// Most recent step boundary, reported or not
    pub fn latest_segment(&self) -> StepSegment {
        self.segment
    }

    /// Feed one accelerometer-norm sample taken at `timestamp`
    ///
    /// Peaks are confirmed one sample late, so a segment ending at the
    /// previous sample may be reported from this call.
    pub fn update(&mut self, acc_norm: NtPrecise, timestamp: NtTime) {
        match self.look_for_peak(acc_norm) {
            Some(Extremum::NegativePeak) => {
                if self.is_valid_negative_peak() {
                    self.last_neg_peak_time = self.prev_time;
                    self.last_neg_peak_mag = self.prev_acc_norm;
                }
            }
            Some(_) => {
                self.compute_peak_properties();
                if let Some(candidate) = self.check_for_potential_new_step() {
                    self.add_step(candidate);
                }
                self.last_pos_peak_mag = self.prev_acc_norm;
                self.last_pos_peak_time = self.prev_time;
            }
            None => {}
        }

        self.prev_acc_norm = acc_norm;
        self.prev_time = timestamp;
    }

    fn look_for_peak(&mut self, acc_norm: NtPrecise) -> Option<Extremum> {
        if acc_norm >= self.prev_acc_norm {
            let found = self.prev_extremum == Extremum::PotentialNegative;
            self.prev_extremum = Extremum::PotentialPositive;
            found.then_some(Extremum::NegativePeak)
        } else {
            let found = self.prev_extremum == Extremum::PotentialPositive;
            self.prev_extremum = Extremum::PotentialNegative;
            found.then_some(Extremum::PositivePeak)
        }
    }

    /// While walking, a valley counts when it is deep enough or when it
    /// falls outside the early part of the expected half stride.
    fn is_valid_negative_peak(&self) -> bool {
        if self.state != SegmenterState::MidWalk {
            return true;
        }
        let since_last = self.prev_time - self.last_neg_peak_time;
        let expected = half(self.expected_stride_period);
        let depth = self.last_step_peak_mag - self.prev_acc_norm;
        since_last > expected
            || depth > MIN_PEAK_ACC_INITIAL
            || expected - since_last < quarter(self.expected_stride_period)
    }

    fn compute_peak_properties(&mut self) {
        let peak_period = self.prev_time - self.last_pos_peak_time;
        let step_period = self.prev_time - self.segment.stop_time;
        let peak_mag = self.prev_acc_norm - self.last_neg_peak_mag;
        let mut flags = PeakFlags::default();

        if peak_period <= MAX_STRIDE_TIME {
            flags.set(PeakFlags::PEAK_PERIOD_SHORT_ENOUGH);
        }
        if step_period <= MAX_STEP_TIME {
            flags.set(PeakFlags::STEP_PERIOD_SHORT_ENOUGH);
        }
        if self.last_neg_peak_time < self.segment.stop_time {
            flags.set(PeakFlags::VALID_NEG_PEAK_SINCE_LAST_STEP);
        }
        if peak_mag > MIN_PEAK_ACC {
            flags.set(PeakFlags::MAG_LARGE_ENOUGH);
        } else {
            if self.state == SegmenterState::MidWalk && self.step_mag_valid {
                flags.set(PeakFlags::CONSECUTIVE_LARGE_ENOUGH_PEAKS);
            }
            // a walk may start on a weaker peak
            if self.state == SegmenterState::EndWalk && peak_mag > MIN_PEAK_ACC_INITIAL {
                flags.set(PeakFlags::MAG_LARGE_ENOUGH);
            }
        }

        if self.state == SegmenterState::MidWalk {
            let stride_period = self.prev_time - self.segment.start_time;
            if (stride_period - self.expected_stride_period).abs()
                <= quarter(self.expected_stride_period)
            {
                flags.set(PeakFlags::STRIDE_PERIOD_NEAR_EXPECTED);
            }
        }
        self.peak_flags = flags;
    }

    /// Candidate segment ending at the peak just confirmed, if it is a step
    /// or ends the walk
    fn check_for_potential_new_step(&mut self) -> Option<StepSegment> {
        let mut candidate = StepSegment {
            start_time: self.segment.stop_time,
            stop_time: self.prev_time,
            kind: StepSegmentType::MidStep,
        };
        self.last_step_peak_mag = self.prev_acc_norm;

        let walk_ended = !self.peak_flags.contains(PeakFlags::STEP_PERIOD_SHORT_ENOUGH);
        if walk_ended && self.state != SegmenterState::EndWalk {
            candidate.kind = StepSegmentType::LastStep;
            if self.segment.stop_time > self.last_pos_peak_time {
                candidate.stop_time = self.last_pos_peak_time;
            }
        }

        if peak_meets_step_criteria(self.peak_flags) {
            if self.state == SegmenterState::EndWalk {
                candidate.start_time = self.last_pos_peak_time;
                candidate.kind = StepSegmentType::FirstStep;
            }
            return Some(candidate);
        }
        (walk_ended && self.state != SegmenterState::EndWalk).then_some(candidate)
    }

    fn add_step(&mut self, candidate: StepSegment) {
        let initial_state = self.state;
        let stride_period = candidate.stop_time - self.segment.start_time;

        self.step_mag_valid = self.peak_flags.contains(PeakFlags::MAG_LARGE_ENOUGH);
        self.segment = candidate;

        if self.state != SegmenterState::EndWalk && candidate.kind == StepSegmentType::LastStep {
            self.state = SegmenterState::EndWalk;
            self.expected_stride_period = DEFAULT_EXPECTED_STRIDE_PERIOD;
        } else if self.state == SegmenterState::EndWalk {
            self.state = SegmenterState::StartWalk;
            self.stored.clear();
        }

        let mut valid_step = true;
        match self.state {
            SegmenterState::EndWalk => {
                if initial_state == SegmenterState::MidWalk {
                    log::debug!("walk ended at {}", self.segment.stop_time);
                    self.emit(self.segment);
                } else {
                    log::trace!("walk abandoned after {} steps", self.stored.len());
                }
            }
            SegmenterState::StartWalk if self.stored.len() < NUM_STEPS_BEFORE_REPORTING => {
                if self.stored.is_empty() {
                    // left and right flanks of the first peak must be similar
                    let height_delta = (self.last_pos_peak_mag - self.prev_acc_norm).abs();
                    let height_right = self.prev_acc_norm - self.last_neg_peak_mag;
                    if height_delta > height_right * PEAK_SYMMETRY_RATIO {
                        valid_step = false;
                    }
                    self.segment.kind = StepSegmentType::FirstStep;
                }
            }
            SegmenterState::StartWalk => {
                log::debug!("walk confirmed at {}", self.segment.stop_time);
                let stored = core::mem::take(&mut self.stored);
                for step in stored.iter() {
                    self.emit(*step);
                }
                self.emit(self.segment);
                self.state = SegmenterState::MidWalk;
            }
            SegmenterState::MidWalk => self.emit(self.segment),
        }

        if self.state == SegmenterState::MidWalk {
            self.expected_stride_period = stride_period;
        }
        if self.state == SegmenterState::StartWalk
            && valid_step
            && self.stored.push(self.segment).is_err()
        {
            log::warn!("more than {} steps held back", NUM_STEPS_BEFORE_REPORTING);
        }
    }

    fn emit(&mut self, segment: StepSegment) {
        if let Some(listener) = self.listener.as_mut() {
            listener.on_segment(&segment);
        }
    }
}
