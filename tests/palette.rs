use std::collections::HashMap;

use palsprite::palette::*;
use palsprite::renderer::backend::HeadlessBackend;

fn ramp() -> Palette {
    Palette::new(std::array::from_fn(|i| argb(255, i as u8, i as u8, i as u8)))
}

fn texel(bank: &HardwarePalette, row: usize, index: usize) -> [u8; 4] {
    let at = (row * PALETTE_SIZE + index) * 4;
    bank.buffer()[at..at + 4].try_into().unwrap()
}

#[test]
fn test_rows_are_assigned_in_registration_order() {
    let mut bank = HardwarePalette::new(4);
    assert_eq!(bank.add_palette("terrain", ramp(), false).unwrap(), 1);
    assert_eq!(bank.add_palette("player0", ramp(), true).unwrap(), 2);
    assert_eq!(bank.add_palette("player1", ramp(), true).unwrap(), 3);

    let err = bank.add_palette("player2", ramp(), true).unwrap_err();
    assert!(matches!(err, PaletteError::CapacityExceeded { capacity: 4, .. }));
    assert!(matches!(bank.get_palette_index("nope"), Err(PaletteError::NotFound(_))));
}

#[test]
fn test_rotation_cycles_only_modifiable_palettes() {
    let mut bank = HardwarePalette::new(4);
    bank.add_palette("fixed", ramp(), false).unwrap();
    bank.add_palette("water", ramp(), true).unwrap();

    let mut cycle = RotationModifier::new(32, 4);
    cycle.tick();
    bank.apply_modifiers(&[&cycle]);

    // Entry 32 now holds what was entry 35.
    assert_eq!(texel(&bank, 2, 32), [35, 35, 35, 255]);
    assert_eq!(texel(&bank, 1, 32), [32, 32, 32, 255]);
}

#[test]
fn test_modifiers_restart_from_the_definition_each_update() {
    let mut bank = HardwarePalette::new(4);
    bank.add_palette("world", ramp(), true).unwrap();
    let dim = TintModifier::new(0.5, 0.5, 0.5);

    bank.apply_modifiers(&[&dim]);
    bank.apply_modifiers(&[&dim]);
    assert_eq!(texel(&bank, 1, 200), [100, 100, 100, 255]);
}

#[test]
fn test_custom_modifier_sees_working_copies() {
    struct Blackout;
    impl PaletteModifier for Blackout {
        fn adjust_palettes(&self, palettes: &mut HashMap<String, MutablePalette>) {
            if let Some(p) = palettes.get_mut("fog") {
                p.colors_mut().fill(argb(255, 0, 0, 0));
            }
        }
    }

    let mut bank = HardwarePalette::new(4);
    bank.add_palette("fog", ramp(), true).unwrap();
    bank.apply_modifiers(&[&Blackout]);

    assert_eq!(texel(&bank, 1, 128), [0, 0, 0, 255]);
    assert_eq!(bank.palette("fog").unwrap().get(128), argb(255, 128, 128, 128));
}

#[test]
fn test_upload_only_when_changed() {
    let mut backend = HeadlessBackend::new();
    let mut bank = HardwarePalette::new(4);
    bank.add_palette("a", ramp(), true).unwrap();

    let first = bank.upload(&mut backend);
    let again = bank.upload(&mut backend);
    assert_eq!(first, again);
    assert_eq!(bank.generation(), 1);

    bank.set_color_shift("a", 0.25, 0.0, 1.0, 0.0, 1.0).unwrap();
    bank.upload(&mut backend);
    assert_eq!(bank.generation(), 2);
    assert_eq!(backend.texture_size(first.0), Some(palsprite::geometry::Size::new(256, 4)));
}

#[test]
fn test_reference_coordinates() {
    let mut bank = HardwarePalette::new(8);
    bank.add_palette("a", ramp(), false).unwrap();
    bank.add_palette("b", ramp(), false).unwrap();
    let b = bank.palette_reference("b").unwrap();

    assert_eq!(b.index(), 2);
    assert_eq!(b.texture_index(&bank), 0.25);
    assert_eq!(b.texture_mid_index(&bank), 2.5 / 8.0);
    assert!(!b.has_color_shift(&bank));
}

#[test]
fn test_vga_palette_bytes_are_scaled() {
    let mut data = vec![0u8; 768];
    data[3..6].copy_from_slice(&[63, 32, 1]);
    let pal = Palette::from_vga_bytes(&data, Some(0)).unwrap();

    assert_eq!(components(pal.get(1)), (255, 252, 128, 4));
    assert_eq!(components(pal.get(0)).0, 0, "transparent index has zero alpha");
}

#[test]
fn test_repeated_updates_without_modifiers_are_identical() {
    let mut backend = HeadlessBackend::new();
    let mut bank = HardwarePalette::new(4);
    bank.add_palette("units", ramp(), true).unwrap();
    let mut cycle = RotationModifier::new(0, 16);
    cycle.tick();
    bank.update(&mut backend, &[&cycle]);

    bank.update(&mut backend, &[]);
    let (texture, _) = bank.textures().unwrap();
    let first = backend.texture_data(texture).unwrap().to_vec();
    bank.update(&mut backend, &[]);

    assert_eq!(backend.texture_data(texture).unwrap(), &first[..]);
    assert_eq!(texel(&bank, 1, 0), [0, 0, 0, 255]);
}
