//! Monthly cost estimate for provisioned throughput.

use capscale_core::Throughput;

const HOURS_PER_MONTH: f64 = 720.0;
const READ_COST_PER_HOUR: f64 = 0.0065;
const READ_UNITS_PER_PRICE_STEP: f64 = 50.0;
const WRITE_COST_PER_HOUR: f64 = 0.0065;
const WRITE_UNITS_PER_PRICE_STEP: f64 = 10.0;

/// Estimated monthly cost, in dollars, of keeping `throughput` provisioned.
pub fn monthly_estimated_cost(throughput: Throughput) -> f64 {
    let read = throughput.read_units as f64 / READ_UNITS_PER_PRICE_STEP
        * READ_COST_PER_HOUR
        * HOURS_PER_MONTH;
    let write = throughput.write_units as f64 / WRITE_UNITS_PER_PRICE_STEP
        * WRITE_COST_PER_HOUR
        * HOURS_PER_MONTH;
    read + write
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn zero_throughput_costs_nothing() {
        assert_eq!(monthly_estimated_cost(Throughput::default()), 0.0);
    }

    #[test]
    fn writes_cost_five_times_reads() {
        let reads = monthly_estimated_cost(Throughput {
            read_units: 50,
            write_units: 0,
        });
        let writes = monthly_estimated_cost(Throughput {
            read_units: 0,
            write_units: 50,
        });
        assert!(close(reads, 4.68));
        assert!(close(writes, 23.4));
    }

    #[test]
    fn sums_both_dimensions() {
        let cost = monthly_estimated_cost(Throughput {
            read_units: 100,
            write_units: 10,
        });
        assert!(close(cost, 9.36 + 4.68));
    }
}
