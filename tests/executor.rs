use std::sync::Arc;

use oryx::models::libc::Malloc;
use oryx::prelude::*;
use oryx::testing::{const_vn, fresh_state, insn, op, target_vn, tmp_vn, ExitWith, TestLifter};

const EXT_BASE: u64 = 0xf_0000_0000;

#[test]
fn trivial_branch_is_taken_concretely() {
    let lifter = Arc::new(TestLifter::new());
    let rax = lifter.reg_vn("RAX");
    let rbx = lifter.reg_vn("RBX");

    lifter.add_block(Block::new(vec![
        insn(0x1000, 4, vec![op(OpCode::Copy, vec![const_vn(10, 8)], Some(rax))]),
        insn(0x1004, 4, vec![op(OpCode::Copy, vec![const_vn(10, 8)], Some(rbx))]),
        insn(
            0x1008,
            4,
            vec![
                op(OpCode::IntEqual, vec![rax, rbx], Some(tmp_vn(0, 1))),
                op(OpCode::CBranch, vec![target_vn(0x1013), tmp_vn(0, 1)], None),
            ],
        ),
    ]));

    let (state, _builder) = fresh_state(AddressSpace::new(), lifter, 0x1000).unwrap();
    let exploration = DfsExploration::new(state.clone());
    let mut manager = ExecutorManager::new(&state, exploration);

    let found = manager.explore(&[0x1013], &[]).unwrap().expect("reachable");
    assert_eq!(found.pc(), 0x1013);
}

#[test]
fn xor_constraint_produces_the_inverting_input() {
    let lifter = Arc::new(TestLifter::new());
    let ecx = lifter.reg_vn("ECX");

    lifter.add_block(Block::new(vec![insn(
        0x1000,
        8,
        vec![
            op(
                OpCode::IntXor,
                vec![ecx, const_vn(0xaabbccdd, 4)],
                Some(tmp_vn(0, 4)),
            ),
            op(
                OpCode::IntEqual,
                vec![tmp_vn(0, 4), const_vn(0xffffffff, 4)],
                Some(tmp_vn(8, 1)),
            ),
            op(OpCode::CBranch, vec![target_vn(0x2000), tmp_vn(8, 1)], None),
        ],
    )]));

    let (mut state, builder) = fresh_state(AddressSpace::new(), lifter, 0x1000).unwrap();
    let ecx_sym = builder.mk_sym("ecx", 32);
    state.reg_write("ECX", &ecx_sym).unwrap();

    let exploration = DfsExploration::new(state.clone());
    let mut manager = ExecutorManager::new(&state, exploration);

    let mut found = manager.explore(&[0x2000], &[]).unwrap().expect("reachable");
    assert_eq!(found.pc(), 0x2000);
    assert_eq!(
        found.solver().evaluate(&ecx_sym).unwrap().as_u64(),
        0x55443322
    );
}

#[test]
fn loop_accumulator_pins_the_symbolic_input() {
    let lifter = Arc::new(TestLifter::new());
    let eax = lifter.reg_vn("EAX");
    let edi = lifter.reg_vn("EDI");

    lifter.add_block(Block::new(vec![insn(
        0x1000,
        4,
        vec![op(OpCode::Copy, vec![const_vn(0, 4)], Some(eax))],
    )]));
    lifter.add_block(Block::new(vec![
        insn(
            0x1004,
            4,
            vec![op(OpCode::IntAdd, vec![eax, const_vn(1, 4)], Some(eax))],
        ),
        insn(
            0x1008,
            4,
            vec![op(OpCode::IntAdd, vec![edi, const_vn(1, 4)], Some(edi))],
        ),
        insn(
            0x100c,
            4,
            vec![
                op(OpCode::IntSLess, vec![edi, const_vn(10, 4)], Some(tmp_vn(0, 1))),
                op(OpCode::CBranch, vec![target_vn(0x1004), tmp_vn(0, 1)], None),
            ],
        ),
        insn(
            0x1010,
            4,
            vec![
                op(OpCode::IntEqual, vec![eax, const_vn(7, 4)], Some(tmp_vn(8, 1))),
                op(OpCode::CBranch, vec![target_vn(0x2000), tmp_vn(8, 1)], None),
            ],
        ),
        insn(0x1014, 4, vec![op(OpCode::Branch, vec![target_vn(0x9000)], None)]),
    ]));

    let (mut state, builder) = fresh_state(AddressSpace::new(), lifter, 0x1000).unwrap();
    let edi_sym = builder.mk_sym("edi", 32);
    state.reg_write("EDI", &edi_sym).unwrap();
    state.register_linked_function(0x9000, Arc::new(ExitWith(0)));

    let exploration = BfsExploration::new(state.clone());
    let mut manager = ExecutorManager::new(&state, exploration);

    let mut found = manager.explore(&[0x2000], &[]).unwrap().expect("reachable");
    assert_eq!(found.pc(), 0x2000);
    assert_eq!(found.solver().evaluate(&edi_sym).unwrap().as_u64(), 3);
}

#[test]
fn avoid_addresses_are_parked() {
    let lifter = Arc::new(TestLifter::new());
    let rdx = lifter.reg_vn("RDX");

    lifter.add_block(Block::new(vec![insn(
        0x1000,
        4,
        vec![op(OpCode::CBranch, vec![target_vn(0x2000), rdx], None)],
    )]));
    lifter.add_block(Block::new(vec![insn(
        0x1004,
        4,
        vec![op(OpCode::Branch, vec![target_vn(0x3000)], None)],
    )]));

    let (mut state, builder) = fresh_state(AddressSpace::new(), lifter, 0x1000).unwrap();
    let cond = builder.mk_sym("cond", 64);
    state.reg_write("RDX", &cond).unwrap();

    let exploration = BfsExploration::new(state.clone());
    let mut manager = ExecutorManager::new(&state, exploration);

    // the taken branch would reach 0x2000, but it is avoided
    let found = manager.explore(&[0x3000], &[0x2000]).unwrap().expect("reachable");
    assert_eq!(found.pc(), 0x3000);
    assert_eq!(manager.avoided_states().len(), 1);
    assert_eq!(manager.avoided_states()[0].pc(), 0x2000);
}

#[test]
fn infeasible_branches_produce_no_successor() {
    let lifter = Arc::new(TestLifter::new());
    let rax = lifter.reg_vn("RAX");

    // rax == rax + 1 can never hold
    lifter.add_block(Block::new(vec![insn(
        0x1000,
        4,
        vec![
            op(OpCode::IntAdd, vec![rax, const_vn(1, 8)], Some(tmp_vn(0, 8))),
            op(OpCode::IntEqual, vec![rax, tmp_vn(0, 8)], Some(tmp_vn(8, 1))),
            op(OpCode::CBranch, vec![target_vn(0x2000), tmp_vn(8, 1)], None),
        ],
    )]));

    let (mut state, builder) = fresh_state(AddressSpace::new(), lifter, 0x1000).unwrap();
    let x = builder.mk_sym("x", 64);
    state.reg_write("RAX", &x).unwrap();

    let builder2 = state.builder();
    let executor = PcodeExecutor::new(builder2, state.lifter());
    let result = executor.execute_basic_block(state).unwrap();

    assert_eq!(result.active.len(), 1);
    assert_eq!(result.active[0].pc(), 0x1004);
    assert!(result.exited.is_empty());
}

#[test]
fn lazy_solving_forks_both_sides_without_queries() {
    let lifter = Arc::new(TestLifter::new());
    let rdx = lifter.reg_vn("RDX");

    lifter.add_block(Block::new(vec![insn(
        0x1000,
        4,
        vec![op(OpCode::CBranch, vec![target_vn(0x2000), rdx], None)],
    )]));

    let (mut state, builder) = fresh_state(AddressSpace::new(), lifter, 0x1000).unwrap();
    let cond = builder.mk_sym("cond", 64);
    state.reg_write("RDX", &cond).unwrap();

    let config = ExecConfig {
        lazy_solving: true,
        ..ExecConfig::default()
    };
    let executor = PcodeExecutor::with_config(state.builder(), state.lifter(), config);
    let mut result = executor.execute_basic_block(state).unwrap();

    // fall-through first, taken second
    assert_eq!(result.active.len(), 2);
    assert_eq!(result.active[0].pc(), 0x1004);
    assert_eq!(result.active[1].pc(), 0x2000);

    // the constraints were recorded even though nothing was checked yet
    assert_eq!(result.active[0].satisfiable(), CheckResult::Sat);
    assert_eq!(result.active[1].satisfiable(), CheckResult::Sat);
}

#[test]
fn symbolic_load_address_is_rejected() {
    let lifter = Arc::new(TestLifter::new());
    let rax = lifter.reg_vn("RAX");
    let rbx = lifter.reg_vn("RBX");

    lifter.add_block(Block::new(vec![insn(
        0x1000,
        4,
        vec![op(OpCode::Load, vec![const_vn(0, 8), rbx], Some(rax))],
    )]));

    let (mut state, builder) = fresh_state(AddressSpace::new(), lifter, 0x1000).unwrap();
    let ptr = builder.mk_sym("ptr", 64);
    state.reg_write("RBX", &ptr).unwrap();

    let executor = PcodeExecutor::new(state.builder(), state.lifter());
    let err = executor.execute_basic_block(state).unwrap_err();
    assert!(matches!(err, ExecError::SymbolicAddress("load")));
}

#[test]
fn symbolic_return_target_is_rejected() {
    let lifter = Arc::new(TestLifter::new());
    let rax = lifter.reg_vn("RAX");

    lifter.add_block(Block::new(vec![insn(
        0x1000,
        4,
        vec![op(OpCode::Return, vec![rax], None)],
    )]));

    let (mut state, builder) = fresh_state(AddressSpace::new(), lifter, 0x1000).unwrap();
    let target = builder.mk_sym("target", 64);
    state.reg_write("RAX", &target).unwrap();

    let executor = PcodeExecutor::new(state.builder(), state.lifter());
    let err = executor.execute_basic_block(state).unwrap_err();
    assert!(matches!(err, ExecError::SymbolicReturnTarget));
}

#[test]
fn call_and_return_maintain_the_stacktrace() {
    let lifter = Arc::new(TestLifter::new());
    let rax = lifter.reg_vn("RAX");

    lifter.add_block(Block::new(vec![insn(
        0x1000,
        5,
        vec![op(OpCode::Call, vec![target_vn(0x4000)], None)],
    )]));
    lifter.add_block(Block::new(vec![insn(
        0x4000,
        4,
        vec![
            op(OpCode::Copy, vec![const_vn(0x1005, 8)], Some(rax)),
            op(OpCode::Return, vec![rax], None),
        ],
    )]));

    let (state, _builder) = fresh_state(AddressSpace::new(), lifter, 0x1000).unwrap();
    let executor = PcodeExecutor::new(state.builder(), state.lifter());

    let mut result = executor.execute_basic_block(state).unwrap();
    let callee = result.active.pop().unwrap();
    assert_eq!(callee.pc(), 0x4000);
    assert_eq!(callee.stacktrace(), &[0x1005]);

    let mut result = executor.execute_basic_block(callee).unwrap();
    let returned = result.active.pop().unwrap();
    assert_eq!(returned.pc(), 0x1005);
    assert!(returned.stacktrace().is_empty());
}

#[test]
fn indirect_branch_forks_over_satisfying_targets() {
    let lifter = Arc::new(TestLifter::new());
    let rax = lifter.reg_vn("RAX");

    lifter.add_block(Block::new(vec![insn(
        0x1000,
        4,
        vec![op(OpCode::BranchInd, vec![rax], None)],
    )]));

    let (mut state, builder) = fresh_state(AddressSpace::new(), lifter, 0x1000).unwrap();
    let target = builder.mk_sym("target", 64);
    state.reg_write("RAX", &target).unwrap();

    // target ∈ {0x2000, 0x3000}
    let a = builder.mk_uconst(0x2000, 64);
    let b = builder.mk_uconst(0x3000, 64);
    let choice = builder.mk_bool_or(&builder.mk_eq(&target, &a), &builder.mk_eq(&target, &b));
    state.solver().add(&choice);

    let executor = PcodeExecutor::new(state.builder(), state.lifter());
    let result = executor.execute_basic_block(state).unwrap();

    let mut pcs: Vec<u64> = result.active.iter().map(|s| s.pc()).collect();
    pcs.sort_unstable();
    assert_eq!(pcs, vec![0x2000, 0x3000]);

    // each fork is pinned to its own target
    for mut succ in result.active {
        let pinned = succ.pc();
        assert_eq!(succ.solver().evaluate(&target).unwrap().as_u64(), pinned);
    }
}

#[test]
fn linked_model_intercepts_the_program_counter() {
    let lifter = Arc::new(TestLifter::new());
    let (mut state, builder) = fresh_state(AddressSpace::new(), lifter, EXT_BASE).unwrap();

    // a malloc sentinel with RDI = 32 and a pushed return address
    state.register_linked_function(EXT_BASE, Arc::new(Malloc));
    state
        .reg_write("RDI", &builder.mk_uconst(32, 64))
        .unwrap();
    let ret_addr = builder.mk_uconst(0x4242, 64);
    let rsp = state.reg_read("RSP").unwrap();
    state.write(&rsp, &ret_addr).unwrap();

    let executor = PcodeExecutor::new(state.builder(), state.lifter());
    let mut result = executor.execute_basic_block(state).unwrap();

    let mut after = result.active.pop().expect("model returned");
    assert_eq!(after.pc(), 0x4242);

    let rax = after.reg_read("RAX").unwrap();
    let heap_ptr = rax.as_const().expect("bump allocation is concrete");
    assert_eq!(heap_ptr.as_u64(), Amd64.heap_base());
}

#[test]
fn linker_binds_relocations_to_sentinels() {
    let mut space = AddressSpace::new();
    space.register_zero_segment(".got", 0x601000, 16, Perm::READ | Perm::WRITE);
    space.register_relocation(0x601000, "frobnicate", RelocationType::Func);
    space.register_relocation(0x601008, "malloc", RelocationType::Func);

    let lifter = Arc::new(TestLifter::new());
    let (mut state, _builder) = fresh_state(space, lifter, 0x1000).unwrap();

    Linker::new().link(&mut state).unwrap();

    // slot 0 is the exit wrapper, imports follow
    assert_eq!(state.exit_wrapper(), EXT_BASE);
    let unmodelled = state.linked_model(EXT_BASE + 8).expect("bound");
    assert_eq!(unmodelled.name(), "unmodelled_function");
    let malloc = state.linked_model(EXT_BASE + 16).expect("bound");
    assert_eq!(malloc.name(), "malloc");

    // the relocation sites now hold the sentinels
    let slot = state.read_at(0x601000, 8).unwrap();
    assert_eq!(slot.as_const().unwrap().as_u64(), EXT_BASE + 8);

    // running into the unmodelled sentinel exits the state with 309
    state.set_pc(EXT_BASE + 8);
    let executor = PcodeExecutor::new(state.builder(), state.lifter());
    let result = executor.execute_basic_block(state).unwrap();
    assert_eq!(result.exited.len(), 1);
    assert!(result.exited[0].exited());
    assert_eq!(result.exited[0].retcode(), 309);
}

#[test]
fn unknown_syscalls_exit_the_state() {
    let lifter = Arc::new(TestLifter::new());
    let rax = lifter.reg_vn("RAX");

    lifter.add_block(Block::new(vec![insn(
        0x1000,
        2,
        vec![
            op(OpCode::Copy, vec![const_vn(0x1234, 8)], Some(rax)),
            op(OpCode::CallOther, vec![const_vn(0, 8)], None),
        ],
    )]));

    let (mut state, _builder) = fresh_state(AddressSpace::new(), lifter, 0x1000).unwrap();
    state.set_platform(Arc::new(LinuxSyscalls::new()));

    let executor = PcodeExecutor::new(state.builder(), state.lifter());
    let result = executor.execute_basic_block(state).unwrap();
    assert_eq!(result.exited.len(), 1);
    assert_eq!(result.exited[0].retcode(), 309);
}

#[test]
fn exit_syscall_records_the_code() {
    let lifter = Arc::new(TestLifter::new());
    let rax = lifter.reg_vn("RAX");
    let rdi = lifter.reg_vn("RDI");

    lifter.add_block(Block::new(vec![insn(
        0x1000,
        2,
        vec![
            op(OpCode::Copy, vec![const_vn(60, 8)], Some(rax)),
            op(OpCode::Copy, vec![const_vn(7, 8)], Some(rdi)),
            op(OpCode::CallOther, vec![const_vn(0, 8)], None),
        ],
    )]));

    let (mut state, _builder) = fresh_state(AddressSpace::new(), lifter, 0x1000).unwrap();
    state.set_platform(Arc::new(LinuxSyscalls::new()));

    let executor = PcodeExecutor::new(state.builder(), state.lifter());
    let result = executor.execute_basic_block(state).unwrap();
    assert_eq!(result.exited.len(), 1);
    assert_eq!(result.exited[0].retcode(), 7);
}
