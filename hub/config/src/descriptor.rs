//! Sensor descriptors exposed through control parameters 0x08 to 0x18

use heapless::Vec;
use sensorhub_core::{HubError, HubResult, NtPrecise, SensorType};
use sensorhub_packets::{ControlPayload, ParamId};

/// Length of the sensor name field, terminating NUL included
pub const SENSOR_NAME_LEN: usize = 32;

/// Physical sensors that carry a descriptor
pub const NUM_INPUT_SENSORS: usize = 3;

/// Axis mapping from sensor frame to body frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AxisMap {
    Unused = 0,
    PositiveX = 1,
    NegativeX = 2,
    PositiveY = 3,
    NegativeY = 4,
    PositiveZ = 5,
    NegativeZ = 6,
}

impl AxisMap {
    pub const fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(AxisMap::Unused),
            1 => Some(AxisMap::PositiveX),
            2 => Some(AxisMap::NegativeX),
            3 => Some(AxisMap::PositiveY),
            4 => Some(AxisMap::NegativeY),
            5 => Some(AxisMap::PositiveZ),
            6 => Some(AxisMap::NegativeZ),
            _ => None,
        }
    }
}

/// Descriptor field backing a control parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorField {
    AxisMapping,
    ConversionOffset,
    ConversionScale,
    Noise,
    SensorName,
    FactorySkew,
    FactoryOffset,
    BiasStability,
    Repeatability,
    TempCoeff,
    Shake,
    ExpectedNorm,
}

/// How a parameter relates to the sensor descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorSlot {
    /// Never valid as a descriptor access
    Illegal,
    /// Handled by its own action
    NoDescriptor,
    /// Reserved field not stored in the descriptor
    Undefined,
    /// Needs more than a field copy
    FurtherAction,
    Field(DescriptorField),
}

/// Descriptor slot of `param`
pub const fn descriptor_slot(param: ParamId) -> DescriptorSlot {
    use DescriptorField as F;
    use DescriptorSlot as S;

    match param.0 {
        0x00 => S::Illegal,
        0x01..=0x03 | 0x07 | 0x19 | 0x20..=0x24 => S::NoDescriptor,
        0x04..=0x06 | 0x0C..=0x0E | 0x10 | 0x13 => S::Undefined,
        0x08 => S::Field(F::AxisMapping),
        0x09 => S::Field(F::ConversionOffset),
        0x0A => S::Field(F::ConversionScale),
        0x0B => S::Field(F::Noise),
        0x0F => S::Field(F::SensorName),
        0x11 => S::Field(F::FactorySkew),
        0x12 => S::Field(F::FactoryOffset),
        0x14 => S::Field(F::BiasStability),
        0x15 => S::Field(F::Repeatability),
        0x16 => S::Field(F::TempCoeff),
        0x17 => S::Field(F::Shake),
        0x18 => S::Field(F::ExpectedNorm),
        0x1A..=0x1F => S::FurtherAction,
        _ => S::Illegal,
    }
}

/// Static description and factory calibration of a physical sensor
///
/// Scales and noise figures are Q24 fixed point; temperature coefficients
/// and shake susceptibility are 16-bit fixed point kept in raw form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorDescriptor {
    pub axis_mapping: [AxisMap; 3],
    pub conversion_offset: [i32; 3],
    pub conversion_scale: [NtPrecise; 3],
    pub noise: [NtPrecise; 3],
    name: [u8; SENSOR_NAME_LEN],
    /// Factory skew/rotation matrix, row major
    pub factory_skew: [[NtPrecise; 3]; 3],
    pub factory_offset: [i32; 3],
    pub bias_stability: [NtPrecise; 3],
    pub repeatability: [NtPrecise; 3],
    pub temp_coeff: [[i16; 2]; 3],
    pub shake: [i16; 3],
    pub expected_norm: i32,
}

impl SensorDescriptor {
    /// Identity mapping and calibration with the given name
    pub fn new(name: &str) -> Self {
        let one = NtPrecise::ONE;
        let zero = NtPrecise::ZERO;
        let mut descriptor = Self {
            axis_mapping: [AxisMap::PositiveX, AxisMap::PositiveY, AxisMap::PositiveZ],
            conversion_offset: [0; 3],
            conversion_scale: [one; 3],
            noise: [zero; 3],
            name: [0; SENSOR_NAME_LEN],
            factory_skew: [[one, zero, zero], [zero, one, zero], [zero, zero, one]],
            factory_offset: [0; 3],
            bias_stability: [zero; 3],
            repeatability: [zero; 3],
            temp_coeff: [[0; 2]; 3],
            shake: [0; 3],
            expected_norm: 0,
        };
        descriptor.set_name(name);
        descriptor
    }

    /// Store at most 31 bytes of `name`; the rest of the field is NUL
    pub fn set_name(&mut self, name: &str) {
        self.name = [0; SENSOR_NAME_LEN];
        let n = name.len().min(SENSOR_NAME_LEN - 1);
        self.name[..n].copy_from_slice(&name.as_bytes()[..n]);
    }

    pub fn name(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(SENSOR_NAME_LEN);
        core::str::from_utf8(&self.name[..end]).unwrap_or("")
    }

    /// Field contents laid out as the parameter's payload
    pub fn read_field(&self, field: DescriptorField) -> HubResult<ControlPayload> {
        match field {
            DescriptorField::AxisMapping => {
                ControlPayload::bytes(&self.axis_mapping.map(|a| a as u8))
            }
            DescriptorField::ConversionOffset => ControlPayload::words(&self.conversion_offset),
            DescriptorField::ConversionScale => {
                ControlPayload::words(&self.conversion_scale.map(NtPrecise::to_bits))
            }
            DescriptorField::Noise => ControlPayload::words(&self.noise.map(NtPrecise::to_bits)),
            DescriptorField::SensorName => {
                // nothing past the first NUL goes out
                let mut name = [0u8; SENSOR_NAME_LEN];
                let n = self.name().len();
                name[..n].copy_from_slice(&self.name[..n]);
                ControlPayload::bytes(&name)
            }
            DescriptorField::FactorySkew => {
                let mut words = [0i32; 9];
                for (w, v) in words.iter_mut().zip(self.factory_skew.iter().flatten()) {
                    *w = v.to_bits();
                }
                ControlPayload::words(&words)
            }
            DescriptorField::FactoryOffset => ControlPayload::words(&self.factory_offset),
            DescriptorField::BiasStability => {
                ControlPayload::words(&self.bias_stability.map(NtPrecise::to_bits))
            }
            DescriptorField::Repeatability => {
                ControlPayload::words(&self.repeatability.map(NtPrecise::to_bits))
            }
            DescriptorField::TempCoeff => {
                let mut halfwords = [0i16; 6];
                for (h, v) in halfwords.iter_mut().zip(self.temp_coeff.iter().flatten()) {
                    *h = *v;
                }
                ControlPayload::halfwords(&halfwords)
            }
            DescriptorField::Shake => ControlPayload::halfwords(&self.shake),
            DescriptorField::ExpectedNorm => ControlPayload::words(&[self.expected_norm]),
        }
    }

    /// Overwrite a field from a write request payload
    ///
    /// `InvalidParameter` when the payload does not have the field's shape.
    pub fn write_field(&mut self, field: DescriptorField, payload: &ControlPayload) -> HubResult<()> {
        match field {
            DescriptorField::AxisMapping => {
                let raw: [u8; 3] = fixed_bytes(payload)?;
                let mut mapping = [AxisMap::Unused; 3];
                for (m, &r) in mapping.iter_mut().zip(raw.iter()) {
                    *m = AxisMap::from_wire(r).ok_or(HubError::InvalidParameter)?;
                }
                self.axis_mapping = mapping;
            }
            DescriptorField::ConversionOffset => self.conversion_offset = fixed_words(payload)?,
            DescriptorField::ConversionScale => {
                self.conversion_scale = fixed_words(payload)?.map(NtPrecise::from_bits)
            }
            DescriptorField::Noise => self.noise = fixed_words(payload)?.map(NtPrecise::from_bits),
            DescriptorField::SensorName => {
                let raw: [u8; SENSOR_NAME_LEN] = fixed_bytes(payload)?;
                let end = raw.iter().position(|&b| b == 0).unwrap_or(SENSOR_NAME_LEN - 1);
                let name = core::str::from_utf8(&raw[..end]).map_err(|_| HubError::InvalidParameter)?;
                self.set_name(name);
            }
            DescriptorField::FactorySkew => {
                let words: [i32; 9] = fixed_words(payload)?;
                for (v, &w) in self.factory_skew.iter_mut().flatten().zip(words.iter()) {
                    *v = NtPrecise::from_bits(w);
                }
            }
            DescriptorField::FactoryOffset => self.factory_offset = fixed_words(payload)?,
            DescriptorField::BiasStability => {
                self.bias_stability = fixed_words(payload)?.map(NtPrecise::from_bits)
            }
            DescriptorField::Repeatability => {
                self.repeatability = fixed_words(payload)?.map(NtPrecise::from_bits)
            }
            DescriptorField::TempCoeff => {
                let halfwords: [i16; 6] = fixed_halfwords(payload)?;
                for (v, &h) in self.temp_coeff.iter_mut().flatten().zip(halfwords.iter()) {
                    *v = h;
                }
            }
            DescriptorField::Shake => self.shake = fixed_halfwords(payload)?,
            DescriptorField::ExpectedNorm => {
                let [norm]: [i32; 1] = fixed_words(payload)?;
                self.expected_norm = norm;
            }
        }
        Ok(())
    }
}

fn fixed_bytes<const N: usize>(payload: &ControlPayload) -> HubResult<[u8; N]> {
    match payload {
        ControlPayload::Bytes(v) => v.as_slice().try_into().map_err(|_| HubError::InvalidParameter),
        _ => Err(HubError::InvalidParameter),
    }
}

fn fixed_halfwords<const N: usize>(payload: &ControlPayload) -> HubResult<[i16; N]> {
    match payload {
        ControlPayload::Halfwords(v) => {
            v.as_slice().try_into().map_err(|_| HubError::InvalidParameter)
        }
        _ => Err(HubError::InvalidParameter),
    }
}

fn fixed_words<const N: usize>(payload: &ControlPayload) -> HubResult<[i32; N]> {
    match payload {
        ControlPayload::Words(v) => v.as_slice().try_into().map_err(|_| HubError::InvalidParameter),
        _ => Err(HubError::InvalidParameter),
    }
}

/// Descriptors of the physical sensors, keyed by base sensor type
#[derive(Debug, Clone, Default)]
pub struct DescriptorTable {
    entries: Vec<(SensorType, SensorDescriptor), NUM_INPUT_SENSORS>,
}

impl DescriptorTable {
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Add or replace the descriptor of `sensor`
    pub fn insert(&mut self, sensor: SensorType, descriptor: SensorDescriptor) -> HubResult<()> {
        let base = sensor.base();
        if !base.is_valid() {
            return Err(HubError::SensorInvalidType);
        }
        if let Some(entry) = self.entries.iter_mut().find(|(s, _)| *s == base) {
            entry.1 = descriptor;
            return Ok(());
        }
        self.entries
            .push((base, descriptor))
            .map_err(|_| HubError::InvalidParameter)
    }

    pub fn get(&self, sensor: SensorType) -> Option<&SensorDescriptor> {
        let base = sensor.base();
        self.entries.iter().find(|(s, _)| *s == base).map(|(_, d)| d)
    }

    pub fn get_mut(&mut self, sensor: SensorType) -> Option<&mut SensorDescriptor> {
        let base = sensor.base();
        self.entries
            .iter_mut()
            .find(|(s, _)| *s == base)
            .map(|(_, d)| d)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots() {
        assert_eq!(descriptor_slot(ParamId::ERROR_CODE_IN_DATA), DescriptorSlot::Illegal);
        assert_eq!(descriptor_slot(ParamId::ENABLE), DescriptorSlot::NoDescriptor);
        assert_eq!(descriptor_slot(ParamId::POWER), DescriptorSlot::Undefined);
        assert_eq!(descriptor_slot(ParamId::XYZ_OFFSET), DescriptorSlot::Undefined);
        assert_eq!(
            descriptor_slot(ParamId::EXPECTED_NORM),
            DescriptorSlot::Field(DescriptorField::ExpectedNorm)
        );
        assert_eq!(
            descriptor_slot(ParamId::DYNAMIC_CAL_SOURCE),
            DescriptorSlot::FurtherAction
        );
        assert_eq!(descriptor_slot(ParamId(0x30)), DescriptorSlot::Illegal);
    }

    #[test]
    fn test_name_is_truncated_and_terminated() {
        let mut d = SensorDescriptor::new("accel");
        assert_eq!(d.name(), "accel");
        d.set_name("a-very-long-sensor-name-that-does-not-fit");
        assert_eq!(d.name().len(), SENSOR_NAME_LEN - 1);
    }

    #[test]
    fn test_field_write_then_read() {
        let mut d = SensorDescriptor::new("gyro");
        let skew = ControlPayload::words(&[1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap();
        d.write_field(DescriptorField::FactorySkew, &skew).unwrap();
        assert_eq!(d.factory_skew[1][2], NtPrecise::from_bits(6));
        assert_eq!(d.read_field(DescriptorField::FactorySkew).unwrap(), skew);

        let coeff = ControlPayload::halfwords(&[1, -1, 2, -2, 3, -3]).unwrap();
        d.write_field(DescriptorField::TempCoeff, &coeff).unwrap();
        assert_eq!(d.temp_coeff[2], [3, -3]);
    }

    #[test]
    fn test_field_shape_checked() {
        let mut d = SensorDescriptor::new("mag");
        let short = ControlPayload::words(&[1, 2]).unwrap();
        assert_eq!(
            d.write_field(DescriptorField::ConversionOffset, &short),
            Err(HubError::InvalidParameter)
        );
        let bad_axis = ControlPayload::bytes(&[1, 9, 5]).unwrap();
        assert_eq!(
            d.write_field(DescriptorField::AxisMapping, &bad_axis),
            Err(HubError::InvalidParameter)
        );
    }

    #[test]
    fn test_table_keyed_by_base_sensor() {
        let mut table = DescriptorTable::new();
        table
            .insert(SensorType::ACCELEROMETER, SensorDescriptor::new("accel"))
            .unwrap();
        assert!(table.get(SensorType::ACCELEROMETER.private()).is_some());
        table
            .insert(SensorType::ACCELEROMETER, SensorDescriptor::new("accel2"))
            .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(SensorType::ACCELEROMETER).map(|d| d.name()), Some("accel2"));
        assert!(table.get(SensorType::GYROSCOPE).is_none());
    }
}
