use protocell_core::{CellWorld, Opcode, ProtocellConfig};
use protocell_render::{Lens, PixelBuffer, render};

fn empty_world() -> CellWorld {
    let config = ProtocellConfig {
        grid_width: 8,
        grid_height: 8,
        genome_len: 8,
        seed_count: 0,
        pass_reseed_threshold: 0,
        advance_reseed_threshold: 0,
        rng_seed: Some(1),
        ..ProtocellConfig::default()
    };
    CellWorld::new(config).expect("world")
}

fn buffer_len(buffer: &PixelBuffer) -> usize {
    (buffer.width * buffer.height * 4) as usize
}

#[test]
fn cell_lenses_cover_the_whole_grid() {
    let world = empty_world();
    for lens in [Lens::Energy, Lens::Genome, Lens::Feed] {
        let buffer = render(&world, lens);
        assert_eq!(buffer.width, 8);
        assert_eq!(buffer.height, 8);
        assert_eq!(buffer.data.len(), buffer_len(&buffer));
    }
}

#[test]
fn age_lens_is_a_single_row_strip() {
    let world = empty_world();
    let buffer = render(&world, Lens::Age);
    assert_eq!(buffer.width, 8);
    assert_eq!(buffer.height, 1);
    assert_eq!(buffer.data.len(), buffer_len(&buffer));
    // Chemical energy deepens along the strip, so blue must not decrease.
    let shallow = buffer.pixel(0, 0);
    let deep = buffer.pixel(7, 0);
    assert!(deep[2] >= shallow[2]);
}

#[test]
fn energy_lens_separates_live_corpse_and_vacuum() {
    let mut world = empty_world();
    let live = {
        let mut bytes = vec![255u8; 8];
        bytes[0] = Opcode::Photo.byte();
        bytes
    };
    let corpse = {
        let mut bytes = vec![255u8; 8];
        bytes[0] = Opcode::Death.byte();
        bytes
    };
    world.spawn_cell(0, 0, &live, 50.0, 0).expect("live");
    world.spawn_cell(0, 1, &corpse, 50.0, 0).expect("corpse");

    let buffer = render(&world, Lens::Energy);

    let live_px = buffer.pixel(0, 0);
    assert_eq!(live_px[0], 127);
    assert_eq!(live_px[1], 0);
    assert_eq!(live_px[2], 0);

    let corpse_px = buffer.pixel(1, 0);
    assert_eq!(corpse_px[1], 255);
    assert_eq!(corpse_px[2], 255);

    let vacuum_px = buffer.pixel(2, 0);
    assert_eq!(vacuum_px, [0, 255, 0, 255]);
}

#[test]
fn genome_lens_colors_by_lineage() {
    let mut world = empty_world();
    let mut kin = vec![255u8; 8];
    kin[0] = Opcode::Photo.byte();
    let mut stranger = kin.clone();
    stranger[7] = 3;
    world.spawn_cell(0, 0, &kin, 50.0, 0).expect("a");
    world.spawn_cell(0, 1, &kin, 50.0, 0).expect("b");
    world.spawn_cell(0, 2, &stranger, 50.0, 0).expect("c");

    let buffer = render(&world, Lens::Genome);

    assert_eq!(buffer.pixel(0, 0), buffer.pixel(1, 0));
    assert_ne!(buffer.pixel(0, 0), buffer.pixel(2, 0));
    assert_eq!(buffer.pixel(3, 0), [0, 0, 0, 255], "vacuum stays black");
}

#[test]
fn feed_lens_starts_on_the_idle_swatch() {
    let mut world = empty_world();
    let mut bytes = vec![255u8; 8];
    bytes[0] = Opcode::Photo.byte();
    world.spawn_cell(4, 4, &bytes, 50.0, 0).expect("cell");

    let buffer = render(&world, Lens::Feed);
    assert_eq!(buffer.pixel(4, 4), [192, 192, 192, 255]);
}
