use ndarray::{Array2, Array3, Axis, Ix2, arr2, arr3, stack};
use paf_pipeline::SamplingGrid;
use paf_pipeline::edge_maps::{distance_to_edge, make_edge_maps, make_multi_pafs, make_pafs};
use paf_pipeline::util::gaussian_pdf;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn random_edges(rng: &mut ChaCha8Rng, n: usize) -> (Array2<f32>, Array2<f32>) {
    let src = Array2::from_shape_fn((n, 2), |_| rng.random_range(-20.0f32..20.0));
    let dst = Array2::from_shape_fn((n, 2), |(i, c)| src[[i, c]] + rng.random_range(1.0f32..15.0));
    (src, dst)
}

#[test]
fn test_points_on_segment_have_zero_distance() {
    let src = arr2(&[[1.0f32, 2.0], [-4.0, 0.0]]);
    let dst = arr2(&[[9.0f32, 6.0], [-4.0, 10.0]]);
    for t in [0.0f32, 0.25, 0.5, 0.75, 1.0] {
        let points = Array2::from_shape_fn((2, 2), |(e, c)| src[[e, c]] + t * (dst[[e, c]] - src[[e, c]]));
        let d = distance_to_edge(points.view().into_dyn(), src.view(), dst.view()).unwrap();
        assert!(d[[0, 0]].abs() < 1e-5, "t={t} got {}", d[[0, 0]]);
        assert!(d[[1, 1]].abs() < 1e-5, "t={t} got {}", d[[1, 1]]);
    }
}

#[test]
fn test_segment_distance_not_less_than_line_distance() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let (src, dst) = random_edges(&mut rng, 6);
    let points = Array2::from_shape_fn((200, 2), |_| rng.random_range(-40.0f32..40.0));
    let d = distance_to_edge(points.view().into_dyn(), src.view(), dst.view())
        .unwrap()
        .into_dimensionality::<Ix2>()
        .unwrap();
    for (p, row) in points.outer_iter().zip(d.outer_iter()) {
        for e in 0..6 {
            let (dx, dy) = (dst[[e, 0]] - src[[e, 0]], dst[[e, 1]] - src[[e, 1]]);
            let (rx, ry) = (p[0] - src[[e, 0]], p[1] - src[[e, 1]]);
            let cross = rx * dy - ry * dx;
            let line_distance = cross * cross / (dx * dx + dy * dy);
            assert!(row[e] + 1e-2 >= line_distance, "{} < {}", row[e], line_distance);
        }
    }
}

#[test]
fn test_distance_keeps_leading_shape() {
    let points = arr3(&[[[0.0f32, 0.0], [1.0, 1.0], [2.0, 2.0]], [[3.0, 3.0], [4.0, 4.0], [5.0, 5.0]]]);
    let src = arr2(&[[0.0f32, 0.0], [0.0, 0.0], [1.0, 1.0], [2.0, 2.0]]);
    let dst = arr2(&[[1.0f32, 0.0], [0.0, 1.0], [2.0, 1.0], [3.0, 3.0]]);
    let d = distance_to_edge(points.view().into_dyn(), src.view(), dst.view()).unwrap();
    assert_eq!(d.shape(), &[2, 3, 4]);
}

#[test]
fn test_confidence_peak_and_monotonic() {
    assert_eq!(gaussian_pdf(0.0, 1.0), 1.0);
    let grid = SamplingGrid::new(1, 30, 1).unwrap();
    let src = arr2(&[[0.0f32, 0.0]]);
    let dst = arr2(&[[0.0f32, 0.0]]);
    let maps = make_edge_maps(&grid, src.view(), dst.view(), 3.0).unwrap();
    assert_eq!(maps[[0, 0, 0]], 1.0);
    for c in 1..30 {
        assert!(maps[[0, c, 0]] <= maps[[0, c - 1, 0]]);
        assert!(maps[[0, c, 0]] < 1.0);
    }
}

#[test]
fn test_unit_vectors_have_unit_norm() {
    let grid = SamplingGrid::new(12, 12, 1).unwrap();
    let src = arr2(&[[2.0f32, 2.0], [1.0, 9.0], [10.0, 3.0]]);
    let dst = arr2(&[[8.0f32, 8.0], [7.0, 9.0], [10.0, 11.0]]);
    let pafs = make_pafs(&grid, src.view(), dst.view(), 2.0).unwrap();
    // Grid samples lying exactly on each edge have confidence 1.
    for (e, (r, c)) in [(0usize, (5usize, 5usize)), (1, (9, 4)), (2, (7, 10))] {
        let (x, y) = (pafs[[r, c, e, 0]], pafs[[r, c, e, 1]]);
        assert!(((x * x + y * y).sqrt() - 1.0).abs() < 1e-5);
    }
    assert!((pafs[[5, 5, 0, 0]] - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    assert!((pafs[[9, 4, 1, 0]] - 1.0).abs() < 1e-6);
    assert!((pafs[[7, 10, 2, 1]] - 1.0).abs() < 1e-6);
}

#[test]
fn test_single_edge_scenario() {
    let grid = SamplingGrid::new(20, 20, 1).unwrap();
    let sources = arr3(&[[[0.0f32, 0.0]]]);
    let destinations = arr3(&[[[10.0f32, 0.0]]]);
    let pafs = make_multi_pafs(&grid, sources.view(), destinations.view(), 1.0).unwrap();
    assert_eq!(pafs.shape(), &[20, 20, 1, 2]);
    // On the segment.
    assert!((pafs[[0, 10, 0, 0]] - 1.0).abs() < 1e-6);
    assert!(pafs[[0, 10, 0, 1]].abs() < 1e-6);
    for c in 0..=10 {
        assert!((pafs[[0, c, 0, 0]] - 1.0).abs() < 1e-6);
        assert!(pafs[[0, c, 0, 1]].abs() < 1e-6);
    }
    // Far away.
    assert!(pafs[[19, 19, 0, 0]].abs() < 1e-6);
    assert!(pafs[[19, 19, 0, 1]].abs() < 1e-6);
}

#[test]
fn test_degenerate_instances_aggregate_to_zero() {
    let grid = SamplingGrid::new(10, 10, 1).unwrap();
    let sources = arr3(&[[[5.0f32, 5.0]], [[5.0, 5.0]]]);
    let single = make_pafs(&grid, sources.index_axis(Axis(0), 0), sources.index_axis(Axis(0), 0), 1.0).unwrap();
    assert!(single[[5, 5, 0, 0]].is_nan());

    let pafs = make_multi_pafs(&grid, sources.view(), sources.view(), 1.0).unwrap();
    assert_eq!(pafs[[5, 5, 0, 0]], 0.0);
    assert_eq!(pafs[[5, 5, 0, 1]], 0.0);
    assert!(pafs.iter().all(|v| *v == 0.0));
}

#[test]
fn test_missing_points_do_not_poison_other_instances() {
    let grid = SamplingGrid::new(10, 10, 1).unwrap();
    let sources = arr3(&[[[1.0f32, 1.0]], [[f32::NAN, f32::NAN]]]);
    let destinations = arr3(&[[[8.0f32, 1.0]], [[4.0, 4.0]]]);
    let pafs = make_multi_pafs(&grid, sources.view(), destinations.view(), 1.0).unwrap();
    assert!(pafs.iter().all(|v| v.is_finite()));
    assert!((pafs[[1, 4, 0, 0]] - 1.0).abs() < 1e-6);
}

#[test]
fn test_aggregation_ignores_instance_order() {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let grid = SamplingGrid::new(24, 32, 2).unwrap();
    let sources = Array3::from_shape_fn((4, 3, 2), |_| rng.random_range(0.0f32..30.0));
    let destinations = Array3::from_shape_fn((4, 3, 2), |_| rng.random_range(0.0f32..30.0));
    let reference = make_multi_pafs(&grid, sources.view(), destinations.view(), 2.0).unwrap();

    let order = [2usize, 0, 3, 1];
    let permute = |a: &Array3<f32>| {
        let views: Vec<_> = order.iter().map(|&i| a.index_axis(Axis(0), i)).collect();
        stack(Axis(0), &views).unwrap()
    };
    let permuted = make_multi_pafs(&grid, permute(&sources).view(), permute(&destinations).view(), 2.0).unwrap();
    for (a, b) in reference.iter().zip(permuted.iter()) {
        assert!((a - b).abs() < 1e-5);
    }
}

#[test]
fn test_overlapping_instances_add_up() {
    let grid = SamplingGrid::new(6, 12, 1).unwrap();
    let sources = arr3(&[[[1.0f32, 3.0]], [[1.0, 3.0]]]);
    let destinations = arr3(&[[[10.0f32, 3.0]], [[10.0, 3.0]]]);
    let pafs = make_multi_pafs(&grid, sources.view(), destinations.view(), 1.0).unwrap();
    assert!((pafs[[3, 5, 0, 0]] - 2.0).abs() < 1e-6);
}
