//! Elementwise activations.

use opdiff_core::Tensor;

fn map(x: &Tensor, f: impl Fn(f32) -> f32) -> Tensor {
    let mut out = x.clone();
    out.data_mut().iter_mut().for_each(|v| *v = f(*v));
    out
}

/// `max(x, 0)`.
pub fn relu(x: &Tensor) -> Tensor {
    map(x, |v| v.max(0.0))
}

/// `min(max(x, 0), 6)`.
pub fn relu6(x: &Tensor) -> Tensor {
    map(x, |v| v.clamp(0.0, 6.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use opdiff_core::Shape;

    #[test]
    fn test_relu() {
        let x = Tensor::from_f32(&[-2.0, -0.0, 0.5, 3.0], &Shape::new(vec![2, 2])).unwrap();
        let y = relu(&x);
        assert_eq!(y.shape(), x.shape());
        assert_eq!(y.data(), &[0.0, 0.0, 0.5, 3.0]);
    }

    #[test]
    fn test_relu6_clips_both_ends() {
        let x = Tensor::from_f32(&[-1.0, 5.5, 6.0, 100.0], &Shape::new(vec![4])).unwrap();
        assert_eq!(relu6(&x).data(), &[0.0, 5.5, 6.0, 6.0]);
    }
}
