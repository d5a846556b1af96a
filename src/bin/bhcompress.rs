//! Bit-heap compression driver.
//!
//! Builds a heap shaped like an `N x M` multiplier (M rows of N bits, row `i`
//! shifted by `i`) or like an explicit list of column heights, compresses it
//! with the chosen strategy and prints the solution and session statistics.
//! With `--checks K` the resulting netlist is evaluated on K random input
//! assignments and compared against the arithmetic sum.
//!
//! Usage: `bhcompress --multiplier 8x8 --strategy max-efficiency --checks 100`

use std::process;

use bumpalo::Bump;
use clap::Parser;
use hashbrown::HashMap;
use log::{error, info};
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, Zero};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use bitheap::core::{ArrivalTime, BitExpr, CircuitBackend, SignalId, TechnologyParams};
use bitheap::{
    BitHeap, BitHeapResult, CompressionSession, CompressionStrategy, CompressorCatalog,
    NetlistBackend, StrategyConfig, StrategyKind,
};

#[derive(Parser, Debug)]
#[command(name = "bhcompress")]
#[command(about = "Compress a bit heap into a compressor tree and a final adder")]
struct Args {
    /// Multiplier-shaped heap, `NxM`
    #[arg(long, value_parser = parse_dimensions, conflicts_with = "columns")]
    multiplier: Option<(u32, u32)>,

    /// Explicit column heights, lsb first
    #[arg(long, value_delimiter = ',')]
    columns: Vec<u32>,

    /// Treat multiplier rows as two's-complement
    #[arg(long)]
    signed: bool,

    /// Constant added to the heap
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    constant: i64,

    /// Placement policy
    #[arg(long, value_enum, default_value_t = StrategyKind::FirstFitting)]
    strategy: StrategyKind,

    /// Consecutive window widenings before giving up
    #[arg(long, default_value_t = 64)]
    retries: u32,

    /// Efficiency a MaxEfficiency placement must exceed
    #[arg(long, default_value_t = 0.0)]
    lower_bound: f64,

    /// Log truth tables grouped by output value
    #[arg(long)]
    compact_tables: bool,

    /// Spread input arrivals uniformly over this many nanoseconds
    #[arg(long, default_value_t = 0.0)]
    spread: f64,

    /// Random assignments to check the netlist against
    #[arg(long, default_value_t = 0)]
    checks: u32,

    /// Seed for arrivals and checks
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Print the generated netlist
    #[arg(long)]
    netlist: bool,
}

fn parse_dimensions(text: &str) -> Result<(u32, u32), String> {
    let (n, m) = text
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected NxM, got {text}"))?;
    let n = n.trim().parse::<u32>().map_err(|e| e.to_string())?;
    let m = m.trim().parse::<u32>().map_err(|e| e.to_string())?;
    if n == 0 || m == 0 {
        return Err("multiplier dimensions must be positive".to_string());
    }
    Ok((n, m))
}

/// A primary input and the weight it enters the heap at.
struct Operand {
    signal: SignalId,
    width: u32,
    is_signed: bool,
    shift: i32,
}

fn random_arrival(rng: &mut StdRng, tech: &TechnologyParams, spread: f64) -> ArrivalTime {
    if spread <= 0.0 {
        return ArrivalTime::ZERO;
    }
    let t = rng.random_range(0.0..spread);
    let cycle = (t / tech.clock_period).floor();
    ArrivalTime::new(cycle as u32, t - cycle * tech.clock_period)
}

fn random_value(rng: &mut StdRng, width: u32) -> BigUint {
    let digits = (0..width.div_ceil(32)).map(|_| rng.random::<u32>()).collect();
    let mask = (BigUint::one() << width as usize) - BigUint::one();
    BigUint::new(digits) & mask
}

fn signed_value(value: &BigUint, width: u32, is_signed: bool) -> BigInt {
    let value = BigInt::from_biguint(Sign::Plus, value.clone());
    if is_signed && value.bit(width as u64 - 1) {
        value - (BigInt::one() << width as usize)
    } else {
        value
    }
}

/// Build the heap described by the arguments.
fn build_heap(
    args: &Args,
    backend: &mut NetlistBackend,
    rng: &mut StdRng,
) -> BitHeapResult<(BitHeap, Vec<Operand>)> {
    let tech = backend.technology();
    let mut operands = Vec::new();
    let magnitude = args.constant.unsigned_abs();

    let mut heap = match args.multiplier {
        Some((n, m)) => {
            let width = (n + m).max(u64::BITS - magnitude.leading_zeros());
            let mut heap = BitHeap::integer(backend, width, args.signed, "multiplier")?;
            for i in 0..m {
                let arrival = random_arrival(rng, &tech, args.spread);
                let signal = backend.add_input_at(&format!("pp{i}"), n, args.signed, arrival);
                heap.add_signal(backend, signal, i as i32)?;
                operands.push(Operand {
                    signal,
                    width: n,
                    is_signed: args.signed,
                    shift: i as i32,
                });
            }
            heap
        }
        None => {
            let max: BigUint = args
                .columns
                .iter()
                .enumerate()
                .map(|(c, &h)| BigUint::from(h) << c)
                .sum::<BigUint>()
                + magnitude;
            let width = max.bits().max(1) as u32;
            let mut heap = BitHeap::integer(backend, width, false, "columns")?;
            for (c, &h) in args.columns.iter().enumerate() {
                for k in 0..h {
                    let arrival = random_arrival(rng, &tech, args.spread);
                    let signal = backend.add_input_at(&format!("c{c}_{k}"), 1, false, arrival);
                    heap.add_bit(backend, c as i32, BitExpr::bit(signal, 0))?;
                    operands.push(Operand {
                        signal,
                        width: 1,
                        is_signed: false,
                        shift: c as i32,
                    });
                }
            }
            heap
        }
    };

    if args.constant > 0 {
        heap.add_constant(&BigInt::from(magnitude), 0)?;
    } else if args.constant < 0 {
        heap.sub_constant(&BigInt::from(magnitude), 0)?;
    }
    Ok((heap, operands))
}

/// Evaluate the netlist on random inputs; returns the number of mismatches.
fn self_check(
    backend: &NetlistBackend,
    operands: &[Operand],
    constant: i64,
    sum: SignalId,
    width: u32,
    checks: u32,
    rng: &mut StdRng,
) -> BitHeapResult<u32> {
    let modulus = BigInt::one() << width as usize;
    let mut failures = 0;

    for check in 0..checks {
        let mut inputs = HashMap::new();
        let mut expected = BigInt::from(constant);
        for op in operands {
            let value = random_value(rng, op.width);
            expected += signed_value(&value, op.width, op.is_signed) << op.shift as usize;
            inputs.insert(op.signal, value);
        }
        expected = ((expected % &modulus) + &modulus) % &modulus;

        let values = backend.evaluate(&inputs)?;
        let actual = values.get(&sum).cloned().unwrap_or_else(BigUint::zero);
        if BigInt::from_biguint(Sign::Plus, actual.clone()) != expected {
            error!("check {check}: expected {expected}, netlist computed {actual}");
            failures += 1;
        }
    }
    Ok(failures)
}

fn run(args: &Args) -> BitHeapResult<u32> {
    let arena = Bump::new();
    let session = CompressionSession::new(&arena);
    let mut backend = NetlistBackend::default();
    let mut rng = StdRng::seed_from_u64(args.seed);

    let (mut heap, operands) = build_heap(args, &mut backend, &mut rng)?;
    info!(
        "Built bitheap {} with {} bits over {} columns",
        heap.name(),
        heap.bit_count(),
        heap.width()
    );

    let config = StrategyConfig::default()
        .with_kind(args.strategy)
        .with_max_window_widenings(args.retries)
        .with_lower_bound(args.lower_bound)
        .with_compact_truth_tables(args.compact_tables);
    let mut strategy = CompressionStrategy::new(config, CompressorCatalog::standard());
    let sum = strategy.start_compression(&mut heap, &mut backend, &session)?;

    print!("{}", strategy.solution().render(strategy.catalog()));
    print!("{}", session.stats());
    println!("Sum: {} ({} bits)", heap.sum_name(), heap.width());
    if args.netlist {
        print!("{backend}");
    }

    if args.checks == 0 {
        return Ok(0);
    }
    let failures = self_check(
        &backend,
        &operands,
        args.constant,
        sum,
        heap.width() as u32,
        args.checks,
        &mut rng,
    )?;
    println!("Self-check: {}/{} assignments correct", args.checks - failures, args.checks);
    Ok(failures)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.multiplier.is_none() && args.columns.is_empty() {
        error!("nothing to compress: pass --multiplier NxM or --columns h0,h1,...");
        process::exit(2);
    }

    match run(&args) {
        Ok(0) => {}
        Ok(failures) => {
            error!("{failures} assignments computed a wrong sum");
            process::exit(1);
        }
        Err(e) => {
            error!("Compression failed: {e}");
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("bhcompress").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_constant_widens_column_heap() {
        let args = args(&["--columns", "1", "--constant", "5", "--checks", "16"]);
        let mut backend = NetlistBackend::default();
        let mut rng = StdRng::seed_from_u64(args.seed);
        let (heap, _) = build_heap(&args, &mut backend, &mut rng).unwrap();
        assert_eq!(heap.width(), 3);

        assert_eq!(run(&args).unwrap(), 0);
    }

    #[test]
    fn test_most_negative_constant() {
        let args = args(&["--columns", "1", "--constant", "-9223372036854775808"]);
        let mut backend = NetlistBackend::default();
        let mut rng = StdRng::seed_from_u64(args.seed);
        let (heap, _) = build_heap(&args, &mut backend, &mut rng).unwrap();
        assert_eq!(heap.width(), 64);
        assert_eq!(heap.pending_constant(), BigInt::from(i64::MIN));
    }

    #[test]
    fn test_constant_widens_multiplier_heap() {
        let args = args(&["--multiplier", "2x2", "--constant", "100", "--checks", "16"]);
        assert_eq!(run(&args).unwrap(), 0);
    }
}
