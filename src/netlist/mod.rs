// This module provides NetlistBackend, the in-memory implementation of the CircuitBackend trait
// used by the bhcompress driver and by the tests. It keeps a signal table (name, width, format,
// arrival time and driver) in creation order, which is also a valid evaluation order since a
// driver can only reference signals that already exist. Wires inherit the latest arrival of the
// bits they read; primitive outputs are scheduled one compressor delay after their latest
// input, rolling into the next cycle when the clock period would be exceeded. The eval
// submodule computes the value of every signal for a given assignment of the primary inputs,
// which is what conservation checks compare against.

//! Reference netlist backend.

pub mod eval;

use std::fmt;

use hashbrown::HashMap;
use log::trace;

use crate::compressor::CompressorShape;
use crate::core::{
    ArrivalTime, BitExpr, BitHeapError, BitHeapResult, CircuitBackend, Primitive, SignalId,
    SignalInfo, TechnologyParams, WireExpr,
};

/// What drives a signal.
#[derive(Debug, Clone, PartialEq)]
pub enum Driver {
    /// Primary input.
    Input,
    /// Continuous assignment.
    Wire(WireExpr),
    /// Output of a primitive instance.
    Instance(Instance),
}

/// Kind of primitive instance.
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceKind {
    Compressor(CompressorShape),
    Adder { width: u32 },
}

/// A primitive instance and its input ports.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub name: String,
    pub kind: InstanceKind,
    pub inputs: Vec<WireExpr>,
}

/// One row of the signal table.
#[derive(Debug, Clone)]
pub struct SignalEntry {
    pub info: SignalInfo,
    pub arrival: ArrivalTime,
    pub driver: Driver,
}

/// In-memory netlist with a simulated scheduler.
#[derive(Debug, Clone)]
pub struct NetlistBackend {
    technology: TechnologyParams,
    signals: Vec<SignalEntry>,
    names: HashMap<String, SignalId>,
    next_uid: u32,
}

impl Default for NetlistBackend {
    fn default() -> Self {
        Self::new(TechnologyParams::default())
    }
}

impl NetlistBackend {
    pub fn new(technology: TechnologyParams) -> Self {
        Self {
            technology,
            signals: Vec::new(),
            names: HashMap::new(),
            next_uid: 0,
        }
    }

    /// Declare an integer primary input available at time zero.
    pub fn add_input(&mut self, name: &str, width: u32, is_signed: bool) -> SignalId {
        self.add_input_at(name, width, is_signed, ArrivalTime::ZERO)
    }

    /// Declare an integer primary input with a given arrival.
    pub fn add_input_at(
        &mut self,
        name: &str,
        width: u32,
        is_signed: bool,
        arrival: ArrivalTime,
    ) -> SignalId {
        self.push(SignalInfo::integer(name, width, is_signed), arrival, Driver::Input)
    }

    /// Declare a fixed-point primary input with weights `[lsb, msb]`.
    pub fn add_fixed_input(
        &mut self,
        name: &str,
        msb: i32,
        lsb: i32,
        is_signed: bool,
        arrival: ArrivalTime,
    ) -> SignalId {
        let info = SignalInfo {
            name: name.to_string(),
            width: (msb - lsb + 1).max(1) as u32,
            is_signed,
            msb,
            lsb,
        };
        self.push(info, arrival, Driver::Input)
    }

    fn push(&mut self, info: SignalInfo, arrival: ArrivalTime, driver: Driver) -> SignalId {
        let id = SignalId(self.signals.len() as u32);
        self.names.insert(info.name.clone(), id);
        self.signals.push(SignalEntry { info, arrival, driver });
        id
    }

    fn entry(&self, signal: SignalId) -> BitHeapResult<&SignalEntry> {
        self.signals
            .get(signal.0 as usize)
            .ok_or_else(|| BitHeapError::UnknownSignal {
                name: signal.to_string(),
            })
    }

    /// Handle of a named signal.
    pub fn signal_id(&self, name: &str) -> Option<SignalId> {
        self.names.get(name).copied()
    }

    pub fn signal(&self, signal: SignalId) -> Option<&SignalEntry> {
        self.signals.get(signal.0 as usize)
    }

    pub fn signals(&self) -> &[SignalEntry] {
        &self.signals
    }

    /// Every primitive instance, in creation order.
    pub fn instances(&self) -> impl Iterator<Item = (SignalId, &Instance)> {
        self.signals.iter().enumerate().filter_map(|(i, e)| match &e.driver {
            Driver::Instance(inst) => Some((SignalId(i as u32), inst)),
            _ => None,
        })
    }

    /// Number of compressor instances.
    pub fn compressor_count(&self) -> usize {
        self.instances()
            .filter(|(_, inst)| matches!(inst.kind, InstanceKind::Compressor(_)))
            .count()
    }

    pub fn set_technology(&mut self, technology: TechnologyParams) {
        self.technology = technology;
    }

    fn expr_arrival(&self, expr: &WireExpr) -> ArrivalTime {
        expr.bits()
            .iter()
            .map(|b| self.bit_arrival(b))
            .fold(ArrivalTime::ZERO, ArrivalTime::latest)
    }

    fn check_bits(&self, expr: &WireExpr) -> BitHeapResult<()> {
        for bit in expr.bits() {
            if let BitExpr::Signal { signal, index } | BitExpr::Inverted { signal, index } = bit {
                let entry = self.entry(signal)?;
                if index >= entry.info.width {
                    return Err(BitHeapError::Backend {
                        reason: format!(
                            "bit {index} of {} (width {})",
                            entry.info.name, entry.info.width
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

impl CircuitBackend for NetlistBackend {
    fn arrival_time(&self, signal: SignalId) -> ArrivalTime {
        self.signal(signal).map_or(ArrivalTime::ZERO, |e| e.arrival)
    }

    fn technology(&self) -> TechnologyParams {
        self.technology
    }

    fn lookup_signal(&self, signal: SignalId) -> BitHeapResult<SignalInfo> {
        Ok(self.entry(signal)?.info.clone())
    }

    fn declare_and_wire(
        &mut self,
        name: &str,
        width: u32,
        rhs: WireExpr,
    ) -> BitHeapResult<SignalId> {
        if self.names.contains_key(name) {
            return Err(BitHeapError::Backend {
                reason: format!("signal {name} declared twice"),
            });
        }
        if rhs.width() != width {
            return Err(BitHeapError::Backend {
                reason: format!(
                    "{name} has width {width} but its right-hand side has {}",
                    rhs.width()
                ),
            });
        }
        self.check_bits(&rhs)?;

        let arrival = self.expr_arrival(&rhs);
        trace!("declare {name} ({width} bits) at {arrival}");
        Ok(self.push(SignalInfo::integer(name, width, false), arrival, Driver::Wire(rhs)))
    }

    fn instantiate_primitive(
        &mut self,
        primitive: Primitive<'_>,
        inputs: &[WireExpr],
    ) -> BitHeapResult<SignalId> {
        for input in inputs {
            self.check_bits(input)?;
        }

        let (kind, width, name) = match primitive {
            Primitive::Compressor(shape) => {
                if inputs.len() != shape.column_count() {
                    return Err(BitHeapError::CompressorInputMismatch {
                        shape: shape.name(),
                        column: inputs.len().min(shape.column_count()),
                        expected: shape.column_count(),
                        found: inputs.len(),
                    });
                }
                for (column, input) in inputs.iter().enumerate() {
                    let expected = shape.column_size(column) as usize;
                    if input.width() as usize != expected {
                        return Err(BitHeapError::CompressorInputMismatch {
                            shape: shape.name(),
                            column,
                            expected,
                            found: input.width() as usize,
                        });
                    }
                }
                let name = format!("{}_uid{}", shape.name(), self.fresh_uid());
                (InstanceKind::Compressor(shape.clone()), shape.output_width(), name)
            }
            Primitive::Adder { width } => {
                let widths: Vec<u32> = inputs.iter().map(WireExpr::width).collect();
                if widths != [width, width, 1] {
                    return Err(BitHeapError::Backend {
                        reason: format!("adder of width {width} got operands of widths {widths:?}"),
                    });
                }
                let name = format!("Adder{}_uid{}", width, self.fresh_uid());
                (InstanceKind::Adder { width }, width, name)
            }
        };

        let latest = inputs
            .iter()
            .map(|i| self.expr_arrival(i))
            .fold(ArrivalTime::ZERO, ArrivalTime::latest);
        let arrival =
            latest.delayed(self.technology.compressor_delay(), self.technology.clock_period);
        trace!("instantiate {name} at {arrival}");

        let instance = Instance {
            name: name.clone(),
            kind,
            inputs: inputs.to_vec(),
        };
        Ok(self.push(SignalInfo::integer(name, width, false), arrival, Driver::Instance(instance)))
    }

    fn fresh_uid(&mut self) -> u32 {
        let uid = self.next_uid;
        self.next_uid += 1;
        uid
    }
}

impl fmt::Display for NetlistBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.signals.iter().enumerate() {
            let name = &entry.info.name;
            match &entry.driver {
                Driver::Input => {
                    writeln!(f, "input s{i} {name}[{}] @ {}", entry.info.width, entry.arrival)?
                }
                Driver::Wire(rhs) => {
                    let bits: Vec<String> = rhs.bits().iter().map(|b| b.to_string()).collect();
                    writeln!(f, "wire  s{i} {name} <= {} @ {}", bits.join(" & "), entry.arrival)?
                }
                Driver::Instance(inst) => writeln!(
                    f,
                    "inst  s{i} {name} ({} ports) @ {}",
                    inst.inputs.len(),
                    entry.arrival
                )?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_inherits_latest_arrival() {
        let mut backend = NetlistBackend::default();
        let a = backend.add_input_at("a", 2, false, ArrivalTime::new(0, 0.4));
        let b = backend.add_input_at("b", 1, false, ArrivalTime::new(1, 0.1));
        let w = backend
            .declare_and_wire(
                "w",
                2,
                WireExpr::from_bits([Some(BitExpr::bit(a, 1)), Some(BitExpr::inverted(b, 0))]),
            )
            .unwrap();
        assert_eq!(backend.arrival_time(w), ArrivalTime::new(1, 0.1));
        assert!(backend.declare_and_wire("w", 1, WireExpr::Zero).is_err());
        assert!(backend
            .declare_and_wire("bad", 1, WireExpr::Bit(BitExpr::bit(a, 2)))
            .is_err());
    }

    #[test]
    fn test_compressor_output_is_scheduled() {
        let mut backend = NetlistBackend::default();
        let a = backend.add_input_at("a", 3, false, ArrivalTime::new(0, 2.0));
        let shape = CompressorShape::new(&[3]).unwrap();
        let inputs = [WireExpr::from_bits((0..3).map(|i| Some(BitExpr::bit(a, i))))];
        let out = backend
            .instantiate_primitive(Primitive::Compressor(&shape), &inputs)
            .unwrap();
        // 2.0 + 0.8 exceeds the 2.5 period
        assert_eq!(backend.arrival_time(out), ArrivalTime::new(1, 0.8));
        assert_eq!(backend.lookup_signal(out).unwrap().width, 2);
        assert_eq!(backend.compressor_count(), 1);
    }

    #[test]
    fn test_compressor_port_mismatch_is_rejected() {
        let mut backend = NetlistBackend::default();
        let a = backend.add_input("a", 2, false);
        let shape = CompressorShape::new(&[3]).unwrap();
        let inputs = [WireExpr::from_bits((0..2).map(|i| Some(BitExpr::bit(a, i))))];
        let err = backend
            .instantiate_primitive(Primitive::Compressor(&shape), &inputs)
            .unwrap_err();
        assert_eq!(
            err,
            BitHeapError::CompressorInputMismatch {
                shape: "Compressor_3_2".to_string(),
                column: 0,
                expected: 3,
                found: 2,
            }
        );
    }
}
