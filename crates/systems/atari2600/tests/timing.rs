//! Whole-machine timing tests.
//!
//! Each test drives the VCS with a small ROM built inline (reset vector
//! $F000) and checks color-clock-level behaviour: WSYNC stretching,
//! write latencies, collision latches, timer rates.

use vcs_core::cpu::Bus6507;
use vcs_atari2600::television::Specification;
use vcs_atari2600::Vcs;

/// Build a 4K image with `program` at $F000 and the reset vector set.
fn rom(program: &[u8]) -> Vec<u8> {
    let mut rom = vec![0xEAu8; 4096];
    rom[..program.len()].copy_from_slice(program);
    rom[0xFFC] = 0x00;
    rom[0xFFD] = 0xF0;
    rom
}

fn vcs_with(program: &[u8]) -> Vcs {
    let mut vcs = Vcs::new(Specification::Ntsc);
    vcs.attach_cartridge(rom(program)).unwrap();
    vcs
}

#[test]
fn test_lda_sta_sequence() {
    // LDA #$42 / STA $80 / JMP $F000
    let mut vcs = vcs_with(&[0xA9, 0x42, 0x85, 0x80, 0x4C, 0x00, 0xF0]);

    let (c1, r1) = vcs.step().unwrap();
    let (c2, r2) = vcs.step().unwrap();

    assert_eq!(vcs.cpu.a, 0x42);
    assert_eq!(vcs.peek(0x0080).unwrap(), 0x42);
    assert_eq!(r1.cycles, 2);
    assert_eq!(r2.cycles, 3);
    assert_eq!(c1 + c2, 5);
}

#[test]
fn test_color_clocks_are_three_per_cycle() {
    let mut vcs = vcs_with(&[0xA9, 0x42, 0x85, 0x80, 0x4C, 0x00, 0xF0]);

    for _ in 0..100 {
        let before = vcs.bus().tia.video_cycles();
        let (cycles, _) = vcs.step().unwrap();
        let clocks = vcs.bus().tia.video_cycles() - before;
        assert_eq!(clocks, 3 * cycles);
    }
}

#[test]
fn test_wsync_stall_from_line_start() {
    // STA WSYNC / JMP $F000, with the first instruction beginning on
    // color clock 0 of a scanline
    let mut vcs = vcs_with(&[0x85, 0x02, 0x4C, 0x00, 0xF0]);
    assert_eq!(vcs.bus().tia.video_cycles(), 0);

    let (cycles, result) = vcs.step().unwrap();

    // the instruction proper is three cycles; the stall stretches it to
    // 225 color clocks, leaving the next fetch on the final CPU cycle of
    // the line
    assert_eq!(result.cycles, 3);
    assert_eq!(cycles, 75);
    assert_eq!(vcs.bus().tia.video_cycles(), 225);
    assert_eq!(vcs.bus().tia.line_clock(), 224);

    // a steady WSYNC loop settles at one scanline per iteration
    let (jmp_cycles, _) = vcs.step().unwrap();
    assert_eq!(jmp_cycles, 3);
    let (stalled, _) = vcs.step().unwrap();
    let (jmp2, _) = vcs.step().unwrap();
    assert_eq!((stalled + jmp2) * 3, 228);
}

#[test]
fn test_jmp_indirect_page_wrap() {
    // pointer at $10FF with the high byte fetched from $1000, not $1100
    let mut image = vec![0xEAu8; 4096];
    image[0x000] = 0x12; // wrapped high byte
    image[0x0FF] = 0x34; // low byte
    image[0x100] = 0x6C; // JMP ($10FF) at $F100
    image[0x101] = 0xFF;
    image[0x102] = 0x10;
    image[0xFFC] = 0x00;
    image[0xFFD] = 0xF1;

    let mut vcs = Vcs::new(Specification::Ntsc);
    vcs.attach_cartridge(image).unwrap();

    let (_, result) = vcs.step().unwrap();
    assert_eq!(vcs.cpu.pc, 0x1234);
    assert!(result.bug.is_some());
}

#[test]
fn test_playfield_write_latency_through_cpu() {
    // LDA #$FF / STA PF1 / NOP
    let mut vcs = vcs_with(&[0xA9, 0xFF, 0x85, 0x0E, 0xEA, 0x4C, 0x00, 0xF0]);

    vcs.step().unwrap(); // LDA
    vcs.step().unwrap(); // STA PF1: serviced on the store cycle
    // the commit is still five color clocks out
    assert_eq!(vcs.bus().tia.video.playfield.pf1, 0x00);

    vcs.step().unwrap(); // NOP spans the commit point
    assert_eq!(vcs.bus().tia.video.playfield.pf1, 0xFF);
}

#[test]
fn test_collision_latch_and_clear() {
    // overlap player 0 (starts five clocks after its reset point) with an
    // eight-clock-wide ball reset at the same strobe position
    let program = [
        0xA9, 0xFF, // LDA #$FF
        0x85, 0x1B, // STA GRP0
        0xA9, 0x02, // LDA #$02
        0x85, 0x1F, // STA ENABL
        0xA9, 0x30, // LDA #$30
        0x85, 0x0A, // STA CTRLPF (ball width 8)
        0x85, 0x10, // STA RESP0
        0x85, 0x14, // STA RESBL
        0x85, 0x02, // STA WSYNC
        0x4C, 0x10, 0xF0, // JMP $F010 (the WSYNC)
    ];
    let mut vcs = vcs_with(&program);

    // run a few scanlines so the sprites draw
    for _ in 0..40 {
        vcs.step().unwrap();
    }

    let cx = vcs.peek(0x0032).unwrap(); // CXP0FB
    assert_eq!(cx & 0x40, 0x40, "player 0 / ball collision latched");

    // blank the player so the pair cannot re-latch, then CXCLR drops all
    // fifteen latches
    vcs.bus_mut().write(0x001B, 0x00); // GRP0
    vcs.step().unwrap();
    vcs.bus_mut().write(0x002C, 0x00); // CXCLR
    vcs.step().unwrap();
    for reg in 0x30..=0x37u16 {
        assert_eq!(vcs.peek(reg).unwrap(), 0x00, "register {:#04x}", reg);
    }
}

#[test]
fn test_tim64t_polling() {
    // LDA #$05 / STA TIM64T / NOP loop
    let mut vcs = vcs_with(&[0xA9, 0x05, 0x8D, 0x96, 0x02, 0xEA, 0xEA, 0x4C, 0x05, 0xF0]);

    vcs.step().unwrap(); // LDA
    vcs.step().unwrap(); // STA TIM64T, armed on the write cycle
    assert_eq!(vcs.peek(0x0284).unwrap(), 5);

    // the NOP/NOP/JMP loop burns 7 cycles per lap; 26 steps leave the
    // timer 60 cycles into its first 64-cycle interval
    for _ in 0..26 {
        vcs.step().unwrap();
    }
    assert_eq!(vcs.peek(0x0284).unwrap(), 5);

    // the next step crosses the 64-cycle boundary
    vcs.step().unwrap();
    assert_eq!(vcs.peek(0x0284).unwrap(), 4);
}

#[test]
fn test_timer_underflow_switches_divisor() {
    // arm TIM64T with 1 and let it underflow
    let mut vcs = vcs_with(&[0xA9, 0x01, 0x8D, 0x96, 0x02, 0xEA, 0x4C, 0x05, 0xF0]);

    vcs.step().unwrap();
    vcs.step().unwrap();

    // run well past one interval
    for _ in 0..80 {
        vcs.step().unwrap();
    }
    assert!(vcs.bus().riot.timer_expired());
    assert_eq!(vcs.bus().riot.timer_interval(), 1);
}

#[test]
fn test_mirrored_writes_read_back_identically() {
    // store to RAM through two mirrors, read back through a third
    let mut vcs = vcs_with(&[0xEA, 0x4C, 0x00, 0xF0]);
    vcs.bus_mut().write(0x0080, 0x5A);
    assert_eq!(vcs.peek(0x0080).unwrap(), 0x5A);
    assert_eq!(vcs.peek(0x0180).unwrap(), 0x5A);

    vcs.bus_mut().write(0x0180, 0xA5);
    assert_eq!(vcs.peek(0x0080).unwrap(), 0xA5);
}

#[test]
fn test_frame_generation_with_simple_kernel() {
    // a minimal frame kernel: 3 lines of VSYNC then 255 WSYNC lines
    let program = [
        0xA9, 0x02, // LDA #$02
        0x85, 0x00, // STA VSYNC
        0x85, 0x02, // STA WSYNC
        0x85, 0x02, // STA WSYNC
        0x85, 0x02, // STA WSYNC
        0xA9, 0x00, // LDA #$00
        0x85, 0x00, // STA VSYNC
        0xA2, 0x00, // LDX #$00
        0x85, 0x02, // STA WSYNC   ($F010)
        0xE8, //       INX
        0xE0, 0xFF, // CPX #$FF
        0xD0, 0xF9, // BNE $F010
        0x4C, 0x00, 0xF0, // JMP $F000
    ];
    let mut vcs = vcs_with(&program);

    let frame = vcs.run_frame().unwrap();
    assert_eq!(frame.width, 160);
    assert_eq!(frame.height, 192);
    assert_eq!(vcs.bus().tv.frame_count(), 1);

    // frames keep coming at a steady cadence
    let cycles_before = vcs.cycles();
    vcs.run_frame().unwrap();
    let per_frame = vcs.cycles() - cycles_before;
    // ~259 scanlines of 76 CPU cycles each
    assert!(per_frame > 250 * 76 && per_frame < 270 * 76, "{}", per_frame);
}

#[test]
fn test_save_state_resumes_identically() {
    let program = [
        0xA9, 0x02, 0x85, 0x00, 0x85, 0x02, 0x85, 0x02, 0x85, 0x02, 0xA9, 0x00, 0x85, 0x00,
        0xA2, 0x00, 0x85, 0x02, 0xE8, 0xE0, 0xFF, 0xD0, 0xF9, 0x4C, 0x00, 0xF0,
    ];
    let mut a = vcs_with(&program);
    for _ in 0..500 {
        a.step().unwrap();
    }

    let state = a.save_state();
    let mut b = Vcs::new(Specification::Ntsc);
    b.load_state(&state).unwrap();

    // both machines must now produce identical observable state
    for _ in 0..500 {
        a.step().unwrap();
        b.step().unwrap();
        assert_eq!(a.cpu.pc, b.cpu.pc);
        assert_eq!(a.cpu.a, b.cpu.a);
        assert_eq!(
            a.bus().tia.line_clock(),
            b.bus().tia.line_clock()
        );
    }
    for addr in 0x0080..0x0100u16 {
        assert_eq!(a.peek(addr).unwrap(), b.peek(addr).unwrap());
    }
}

#[test]
fn test_hmove_in_hblank_shifts_player() {
    // position player 0, then HMOVE it left by 7 on the next line
    let program = [
        0xA9, 0xFF, // LDA #$FF
        0x85, 0x1B, // STA GRP0
        0x85, 0x10, // STA RESP0
        0x85, 0x02, // STA WSYNC
        0xA9, 0x70, // LDA #$70 (HMP0 = +7)
        0x85, 0x20, // STA HMP0
        0x85, 0x2A, // STA HMOVE
        0x85, 0x02, // STA WSYNC
        0x4C, 0x0E, 0xF0, // JMP $F00E (the second WSYNC)
    ];
    let mut vcs = vcs_with(&program);

    // RESP0 lands in HBLANK of the first line
    for _ in 0..3 {
        vcs.step().unwrap();
    }
    let before = vcs.bus().tia.video.player0.position();

    // run through the HMOVE and the following line
    for _ in 0..8 {
        vcs.step().unwrap();
    }
    let after = vcs.bus().tia.video.player0.position();

    // +7 motion: 15 stuffed clocks against the 8 clocks of visible time
    // the late HBLANK removes, a net 7-pixel shift
    assert_eq!((after as u16 + 160 - before as u16) % 160, 7);
}
