//! Column-key inference over realistic deployments.

use roach_mc::cache::DeviceStateCache;
use roach_mc::keys::{canonical_keys, GridKey};
use roach_mc::proxy::mock::MockSupervisor;

fn k(parts: &[u32]) -> GridKey {
    GridKey::from(parts)
}

#[test]
fn mixed_deployment_yields_padded_sorted_columns() {
    // roach1 runs firmware with 2 ADCs x 2 RF inputs; roach2 runs none.
    let mut supervisor = MockSupervisor::two_boards();
    let mut cache = DeviceStateCache::new();
    cache.bulk_refresh(&mut supervisor);

    let sets = vec![
        cache.board_grid_keys().unwrap(),
        cache.rf_grid_keys().unwrap(),
    ];
    let columns = canonical_keys(&sets).unwrap();
    assert_eq!(
        columns,
        vec![
            k(&[0, 0, 0]),
            k(&[0, 0, 1]),
            k(&[0, 1, 0]),
            k(&[0, 1, 1]),
            k(&[1, 0, 0]),
        ]
    );
}

#[test]
fn uniform_depth_needs_no_padding() {
    let sets = vec![vec![
        k(&[1, 0, 0]),
        k(&[0, 0, 0]),
        k(&[1, 0, 1]),
        k(&[0, 0, 1]),
    ]];
    let columns = canonical_keys(&sets).unwrap();
    assert_eq!(
        columns,
        vec![k(&[0, 0, 0]), k(&[0, 0, 1]), k(&[1, 0, 0]), k(&[1, 0, 1])]
    );
}

#[test]
fn synthesized_key_sits_at_the_board_position() {
    // Three boards; only the middle one has firmware.
    let sets = vec![
        vec![k(&[0]), k(&[1]), k(&[2])],
        vec![k(&[1, 0, 0]), k(&[1, 0, 1])],
    ];
    let columns = canonical_keys(&sets).unwrap();
    assert_eq!(
        columns,
        vec![
            k(&[0, 0, 0]),
            k(&[1, 0, 0]),
            k(&[1, 0, 1]),
            k(&[2, 0, 0]),
        ]
    );
}

#[test]
fn adc_depth_rows_share_the_grid_without_adding_columns() {
    let sets = vec![
        vec![k(&[0])],
        vec![k(&[0, 0]), k(&[0, 1])],
        vec![k(&[0, 0, 0]), k(&[0, 0, 1]), k(&[0, 1, 0]), k(&[0, 1, 1])],
    ];
    let columns = canonical_keys(&sets).unwrap();
    assert_eq!(columns.len(), 4);
    assert!(columns.iter().all(|c| c.depth() == 3));
}

#[test]
fn board_whose_deepest_keys_are_adc_level_is_inconsistent() {
    let sets = vec![
        vec![k(&[0]), k(&[1])],
        vec![k(&[0, 0, 0]), k(&[1, 1])],
    ];
    assert!(canonical_keys(&sets).is_err());
}
