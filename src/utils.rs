/// Computes log(sum(exp(x))) in a numerically stable way.
pub fn logsumexp(logs: &[f64]) -> f64 {
    let max = logs.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum = logs.iter().map(|&x| (x - max).exp()).sum::<f64>();
    max + sum.ln()
}

/// Normalizes in place to sum to one. Returns false, leaving a uniform vector, when the total mass is zero.
pub fn normalize(msg: &mut [f64]) -> bool {
    let norm: f64 = msg.iter().sum();

    if norm > 0.0 && norm.is_finite() {
        for x in msg.iter_mut() {
            *x /= norm;
        }
        true
    } else {
        let n = msg.len() as f64;
        for x in msg.iter_mut() {
            *x = 1.0 / n;
        }
        false
    }
}

pub fn uniform(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

pub fn point_mass(n: usize, idx: usize) -> Vec<f64> {
    let mut msg = vec![0.0; n];
    msg[idx] = 1.0;
    msg
}

/// Index of the maximum; ties resolve to the lowest index.
pub fn argmax_first(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

pub fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

/// Advances a row-major assignment (last index fastest). Returns false after the final assignment.
pub fn next_assignment(assignment: &mut [usize], domains: &[usize]) -> bool {
    for j in (0..assignment.len()).rev() {
        assignment[j] += 1;

        if assignment[j] < domains[j] {
            return true;
        }
        assignment[j] = 0;
    }

    false
}
