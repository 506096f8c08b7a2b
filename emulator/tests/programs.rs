use std::fmt::Write as _;
use std::sync::Arc;

use indoc::indoc;
use pretty_assertions::assert_eq;
use vrisc_emulator::display::{DisplayLink, DisplayMode};
use vrisc_emulator::runtime::{
    disassemble, Exception, InMemoryFilesystem, MemoryError, MemoryLayout, ProcessorError,
    RegionKind, SyscallTable,
};
use vrisc_emulator::{assemble, Computer, Config};

/// RAM spans 0..64, VRAM 64..80, the system page 80..92, the stack view 92..108, ROM starts at 108
fn config() -> Config {
    Config {
        layout: MemoryLayout {
            ram_size: 64,
            vram_size: 16,
            system_page_size: 12,
            stack_size: 16,
        },
        max_cycles: Some(10_000),
        ..Config::default()
    }
}

fn load(source: &str) -> Computer {
    let assembly = assemble(source).unwrap();
    Computer::new(
        &assembly.binary,
        &config(),
        Arc::new(SyscallTable::standard()),
    )
    .unwrap()
}

fn run(source: &str) -> Computer {
    let mut computer = load(source);
    computer.run().unwrap();
    computer
}

fn ram(computer: &Computer) -> &[u8] {
    computer.memory.region(RegionKind::Ram).unwrap().data()
}

#[test]
fn add_and_halt() {
    let computer = run(indoc! {"
        LDI #5
        PUSH
        LDI #3
        ADD
        HLT
    "});

    assert_eq!(computer.cpu.registers.register, 8);
    assert!(!computer.running);
    assert_eq!(computer.exit_code, None);
}

#[test]
fn print_string() {
    let computer = run(indoc! {"
        str $0 #2
        str $1 #72   ; H
        str $2 #73   ; I
        ldi $0
        push
        ldi #1
        sys
        hlt
    "});

    assert_eq!(computer.console, vec!["HI".to_owned()]);
}

#[test]
fn counting_loop() {
    let computer = run(indoc! {"
        COUNTER = $10
        LIMIT = #3

                sec
                bge loop

        loop:   cpop            ; drop the return address of the branch
                ldi COUNTER
                push
                ldr             ; r = [COUNTER]
                push
                ldi #1
                clc
                add
                push
                ldi COUNTER
                str             ; [COUNTER] = r + 1

                ldi COUNTER
                push
                ldr
                push
                ldi LIMIT
                grt             ; carry = LIMIT > [COUNTER]
                bge again
                hlt

        again:  cpop
                sec
                bge loop
    "});

    assert_eq!(ram(&computer)[0x10], 3);
    assert_eq!(computer.cpu.registers.register, 3);
    assert_eq!(computer.cpu.call_stack.depth(), 0);
    assert!(computer.cpu.stack.is_empty());
}

#[test]
fn large_mode_and_exit() {
    let computer = run(indoc! {"
        ldi #5
        sys             ; switch to 32-bit operands
        ldi #100000
        push
        ldi #23
        clc
        add
        push
        ldi #2
        sys             ; assert
        ldi #7
        push
        ldi #0
        sys             ; exit
        hlt
    "});

    assert!(computer.cpu.large_mode);
    assert_eq!(computer.cpu.registers.lregister, 0);
    assert_eq!(computer.console, vec!["ASSERT: 0x186b7".to_owned()]);
    assert_eq!(computer.exit_code, Some(7));
}

#[test]
fn stack_underflow_is_soft() {
    let computer = run(indoc! {"
        ldi #9
        pop
        hlt
    "});
    assert_eq!(computer.cpu.registers.register, 0);
}

#[test]
fn read_file_chunk() {
    let mut computer = load(indoc! {"
        str $20 #3
        str $21 #76     ; L
        str $22 #86     ; V
        str $23 #76     ; L
        ldi #4          ; chunk size
        push
        ldi #1          ; chunk offset
        push
        ldi $30         ; destination
        push
        ldi $20         ; path
        push
        ldi #6
        sys
        pop             ; file length
        hlt
    "})
    .with_filesystem(InMemoryFilesystem::default().with_file("LVL", vec![1, 2, 3, 4, 5]));

    computer.run().unwrap();
    assert_eq!(&ram(&computer)[0x30..0x35], &[2, 3, 4, 5, 0]);
    assert_eq!(computer.cpu.registers.register, 5);
}

#[test]
fn missing_file_aborts() {
    let mut computer = load(indoc! {"
        str $20 #1
        str $21 #88
        ldi #1
        push
        push
        push
        ldi $20
        push
        ldi #6
        sys
        hlt
    "})
    .with_filesystem(InMemoryFilesystem::default());

    let err = computer.run().unwrap_err();
    assert!(matches!(err, ProcessorError::Io { ref path, .. } if path == "X"));
    assert!(computer.running);
}

#[test]
fn blit_frame() {
    let (link, frames) = DisplayLink::channel();
    let mut computer = load(indoc! {"
        str $40 #200    ; first pixel of VRAM
        str $41 #100
        ldi #1
        push
        ldi #7
        sys             ; black and white
        ldi #2
        push
        ldi #8
        sys             ; width
        ldi #1
        push
        ldi #9
        sys             ; height
        ldi #3
        sys             ; blit
        hlt
    "})
    .with_display_link(link);

    computer.run().unwrap();
    let frame = frames.try_recv().unwrap();
    assert_eq!(frame.mode, DisplayMode::BlackAndWhite);
    assert_eq!((frame.width, frame.height), (2, 1));
    assert_eq!(frame.rgb(0, 0), Some([200, 200, 200]));
    assert_eq!(frame.rgb(1, 0), Some([100, 100, 100]));
}

#[test]
fn store_to_rom_is_hard_fault() {
    let mut computer = load("str #110 #1\nhlt\n");
    let err = computer.run().unwrap_err();
    assert!(matches!(
        err,
        ProcessorError::Exception(Exception::InvalidMemoryAccess(MemoryError::ReadOnly {
            region: RegionKind::ProgramRom,
            address: 110,
        }))
    ));
}

#[test]
fn system_page_carry() {
    // Offset 4 of the system page mirrors the carry flag
    let computer = run(indoc! {"
        sec
        ldi #84
        push
        ldi #0
        ldr
        hlt
    "});
    assert_eq!(computer.cpu.registers.register, 1);
}

#[test]
fn runaway_program_stops_at_cycle_limit() {
    let mut computer = load("loop: sec\nbge loop\n");
    let err = computer.run().unwrap_err();
    assert!(matches!(err, ProcessorError::CycleLimit(10_000)));
}

#[test]
fn disassembly_listing() {
    let assembly = assemble(indoc! {"
        COUNT = #3
        start:
            ldi COUNT
            push
        loop: sec
            bge loop
            hlt
    "})
    .unwrap();

    let mut listing = String::new();
    for (offset, instruction) in disassemble(&assembly.binary) {
        let offset = u32::try_from(offset).unwrap();
        for label in assembly.symbols.labels_at(offset) {
            writeln!(listing, "{label}:").unwrap();
        }
        writeln!(listing, "{offset:04X}  {}", instruction.unwrap()).unwrap();
    }

    insta::assert_snapshot!(listing, @r###"
    START:
    0000  LDI   #3
    0005  PUSH
    LOOP:
    0006  SEC
    0007  BGE   $6
    000C  HLT
    "###);
}
