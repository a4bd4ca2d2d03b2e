//! The host side of the simulation: ELF loading, initial process environment, and the Linux
//! syscall shim.
//!
//! The shim emulates the handful of syscalls a statically-linked C program issues between
//! `_start` and `exit`. Guest file descriptors index a host fd table: entries 0/1/2 are the
//! stdin/stdout/stderr redirects set up by [`Host::complete_env`], and 3+ are files the guest
//! opened itself. The guest's stdout and stderr land verbatim in `stdout.<pid>` and
//! `stderr.<pid>`.

use crate::hart::Hart;
use crate::memory::{MemoryError, SparseMemory};
use crate::registers::Specifier;
use goblin::elf::program_header::PT_LOAD;
use log::{debug, error, info, warn};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Guest virtual address of the stack block.
const STACK_BASE: u64 = 0x1000_0000;
/// Size of the stack block (4 MiB).
const STACK_SIZE: u64 = 4 * 1024 * 1024;
/// Granularity of mmap allocations.
const PAGE_SIZE: u64 = 4096;
/// Length of one field of the `uname` UTS buffer.
const UTS_LEN: u64 = 65;

/// Syscall argument registers `a0..a5` are `x10..x15`; the result goes back in `a0`.
const A0: Specifier = Specifier::from_u5(10);
const A1: Specifier = Specifier::from_u5(11);
const A2: Specifier = Specifier::from_u5(12);
const A3: Specifier = Specifier::from_u5(13);
const A4: Specifier = Specifier::from_u5(14);
const A5: Specifier = Specifier::from_u5(15);
/// The syscall number register, `a7`.
const A7: Specifier = Specifier::from_u5(17);

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read executable: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed ELF: {0}")]
    Elf(#[from] goblin::error::Error),
    #[error("not a 64-bit ELF executable")]
    NotElf64,
    #[error("program segments overlap: {0}")]
    Memory(#[from] MemoryError),
}

/// The host shim.
#[derive(Debug)]
pub struct Host {
    prog_name: String,
    /// Guest arguments (`argv[1..]`).
    args: Vec<String>,
    /// Host files behind each guest fd. `None` marks a closed or never-opened slot.
    fds: Vec<Option<File>>,
    /// Heap watermark: the highest guest address backed by a load segment or sbrk growth.
    top_of_mem: u64,
    /// Bump pointer for mmap allocations. Starts just above the stack block and advances by
    /// page-rounded lengths.
    mmap_base: u64,
    /// Optional file to serve as guest stdin.
    stdin_path: Option<PathBuf>,
    /// Directory receiving `stdout.<pid>` / `stderr.<pid>`.
    output_dir: PathBuf,
    exited: bool,
    exit_status: u64,
}

impl Host {
    pub fn new(prog_name: String) -> Self {
        Self {
            prog_name,
            args: Vec::new(),
            fds: Vec::new(),
            top_of_mem: 0,
            mmap_base: STACK_BASE + STACK_SIZE,
            stdin_path: None,
            output_dir: PathBuf::from("."),
            exited: false,
            exit_status: 0,
        }
    }

    /// Appends a guest argument (`argv[1..]`).
    pub fn add_arg(&mut self, arg: String) {
        self.args.push(arg);
    }

    /// Selects the file served as guest stdin.
    pub fn set_stdin(&mut self, path: PathBuf) {
        self.stdin_path = Some(path);
    }

    /// Redirects `stdout.<pid>` / `stderr.<pid>` into `dir` instead of the working directory.
    pub fn set_output_dir(&mut self, dir: PathBuf) {
        self.output_dir = dir;
    }

    /// True once the guest has called exit/exit_group.
    pub fn exited(&self) -> bool {
        self.exited
    }

    /// The status the guest exited with.
    pub fn exit_status(&self) -> u64 {
        self.exit_status
    }

    /// Loads a 64-bit ELF executable into guest memory and points the hart at its entry.
    ///
    /// Each LOAD segment becomes one block at `p_vaddr` of `max(p_filesz, p_memsz)` bytes with
    /// the end rounded up to `p_align`; `p_filesz` bytes are copied from the file and the rest is
    /// zero.
    pub fn load_elf(&mut self, path: &Path, hart: &mut Hart, memory: &mut SparseMemory) -> Result<(), LoadError> {
        let image = std::fs::read(path)?;
        let elf = goblin::elf::Elf::parse(&image)?;
        if !elf.is_64 {
            return Err(LoadError::NotElf64);
        }

        for header in elf.program_headers.iter().filter(|h| h.p_type == PT_LOAD) {
            debug!(
                "loading segment: file range [{:#x}..{:#x}] to VA [{:#x}..{:#x}]",
                header.p_offset,
                header.p_offset + header.p_filesz,
                header.p_vaddr,
                header.p_vaddr + header.p_memsz,
            );

            let mut size = header.p_filesz.max(header.p_memsz);
            if header.p_align > 1 {
                let end = header.p_vaddr + size;
                size = end.next_multiple_of(header.p_align) - header.p_vaddr;
            }
            memory.add_block(header.p_vaddr, size, Some(&image[header.file_range()]))?;

            self.top_of_mem = self.top_of_mem.max(header.p_vaddr + size - 1);
        }
        info!("top of memory is {:#x}", self.top_of_mem);

        hart.set_pc(elf.header.e_entry);
        Ok(())
    }

    /// Builds the initial process environment: stack, argc/argv, and the standard fds.
    ///
    /// The argv strings are copied descending from the top of the stack, each padded to a
    /// 16-byte boundary after its NUL. Below them sit argc and the argv pointer array; `sp`
    /// points at the argc cell, and the guest sees `a0 = argc`, `a1 = sp`.
    pub fn complete_env(&mut self, hart: &mut Hart, memory: &mut SparseMemory) -> Result<(), MemoryError> {
        memory.add_block(STACK_BASE, STACK_SIZE, None)?;
        let stack_top = STACK_BASE + STACK_SIZE;

        let argv: Vec<String> = std::iter::once(self.prog_name.clone())
            .chain(self.args.iter().cloned())
            .collect();
        let total: u64 = argv
            .iter()
            .map(|arg| (arg.len() as u64 + 1).next_multiple_of(16))
            .sum();

        let mut cursor = stack_top - total;
        let mut pointers = Vec::with_capacity(argv.len());
        for arg in &argv {
            pointers.push(cursor);
            for (k, byte) in arg.bytes().enumerate() {
                memory.write(cursor + k as u64, 1, byte as u64);
            }
            // NUL terminator is already there: the block was born zeroed.
            cursor += (arg.len() as u64 + 1).next_multiple_of(16);
        }

        let argc = argv.len() as u64;
        let sp = stack_top - total - 8 * (argc + 1);
        memory.write(sp, 8, argc);
        for (k, pointer) in pointers.iter().enumerate() {
            memory.write(sp + 8 + 8 * k as u64, 8, *pointer);
        }

        hart.set_x(Specifier::SP, sp);
        hart.set_x(A0, argc);
        hart.set_x(A1, sp);

        // fd 0: guest stdin, if a backing file was configured and exists.
        let stdin = self
            .stdin_path
            .as_ref()
            .and_then(|path| File::open(path).ok());
        self.fds.push(stdin);

        // fds 1/2: per-pid stdout and stderr captures.
        let pid = std::process::id();
        for stream in ["stdout", "stderr"] {
            let path = self.output_dir.join(format!("{stream}.{pid}"));
            self.fds.push(File::create(&path).ok());
        }

        self.mmap_base = STACK_BASE + STACK_SIZE;
        Ok(())
    }

    /// Dispatches the syscall selected by `a7`, writing the result to `a0`.
    pub fn syscall(&mut self, hart: &mut Hart, memory: &mut SparseMemory) {
        let number = hart.x(A7);
        match number {
            56 => self.sys_openat(hart, memory),
            57 => hart.set_x(A0, 0), // close: the fd table keeps its slot
            63 => self.sys_read(hart, memory),
            64 => self.sys_write(hart, memory),
            66 => self.sys_writev(hart, memory),
            78 => self.sys_readlinkat(hart, memory),
            80 => self.sys_fstat(hart, memory),
            93 | 94 => self.sys_exit(hart),
            160 => self.sys_uname(hart, memory),
            // getuid / geteuid / getgid / getegid
            174..=177 => hart.set_x(A0, 3),
            214 => self.sys_sbrk(hart, memory),
            222 => self.sys_mmap(hart, memory),
            other => {
                warn!("unimplemented system call {other}");
                hart.set_x(A0, 0);
            }
        }
    }

    /// Reads the NUL-terminated guest string at `va`. Unmapped memory reads as NUL, so this
    /// always terminates.
    fn read_string(&self, hart: &Hart, memory: &SparseMemory, va: u64) -> String {
        let mut bytes = Vec::new();
        let mut va = va;
        loop {
            let byte = hart.read_imem(memory, va, 1) as u8;
            if byte == 0 {
                break;
            }
            bytes.push(byte);
            va += 1;
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Copies `count` guest bytes starting at `va` into a host buffer.
    ///
    /// Uses fetch semantics so bulk marshalling doesn't flood the data-access trace.
    fn read_buffer(&self, hart: &Hart, memory: &SparseMemory, va: u64, count: u64) -> Vec<u8> {
        (0..count)
            .map(|k| hart.read_imem(memory, va + k, 1) as u8)
            .collect()
    }

    fn fd_file(&mut self, fd: u64) -> Option<&mut File> {
        self.fds.get_mut(fd as usize)?.as_mut()
    }

    /// `openat(dirfd, path, flags, mode)` — `/dev/tty` aliases guest stdout; any write intent
    /// redirects to a fresh per-pid file so the host filesystem is never clobbered.
    fn sys_openat(&mut self, hart: &mut Hart, memory: &mut SparseMemory) {
        let path = self.read_string(hart, memory, hart.x(A1));
        let flags = hart.x(A2);

        if path == "/dev/tty" {
            hart.set_x(A0, 1);
            return;
        }

        // O_WRONLY | O_RDWR | O_CREAT
        let wants_write = flags & 0x3 != 0 || flags & 0x40 != 0;
        let opened = if wants_write {
            let pid = std::process::id();
            let name = self.output_dir.join(format!("{path}.{pid}"));
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(name)
        } else {
            File::open(&path)
        };

        match opened {
            Ok(file) => {
                self.fds.push(Some(file));
                hart.set_x(A0, self.fds.len() as u64 - 1);
            }
            Err(err) => {
                warn!("openat '{path}' failed: {err}");
                hart.set_x(A0, u64::MAX);
            }
        }
    }

    /// `read(fd, buf, len)` — host read into a local buffer, then copy into guest memory.
    fn sys_read(&mut self, hart: &mut Hart, memory: &mut SparseMemory) {
        let (fd, buf, len) = (hart.x(A0), hart.x(A1), hart.x(A2));
        let Some(file) = self.fd_file(fd) else {
            hart.set_x(A0, u64::MAX);
            return;
        };
        let mut local = vec![0u8; len as usize];
        match file.read(&mut local) {
            Ok(count) => {
                for (k, &byte) in local[..count].iter().enumerate() {
                    memory.write(buf + k as u64, 1, byte as u64);
                }
                hart.set_x(A0, count as u64);
            }
            Err(err) => {
                warn!("read from guest fd {fd} failed: {err}");
                hart.set_x(A0, u64::MAX);
            }
        }
    }

    /// `write(fd, buf, len)` — marshal guest bytes and write them to the mapped host file.
    fn sys_write(&mut self, hart: &mut Hart, memory: &mut SparseMemory) {
        let (fd, buf, len) = (hart.x(A0), hart.x(A1), hart.x(A2));
        let bytes = self.read_buffer(hart, memory, buf, len);
        let Some(file) = self.fd_file(fd) else {
            hart.set_x(A0, u64::MAX);
            return;
        };
        match file.write_all(&bytes) {
            Ok(()) => hart.set_x(A0, bytes.len() as u64),
            Err(err) => {
                warn!("write to guest fd {fd} failed: {err}");
                hart.set_x(A0, u64::MAX);
            }
        }
    }

    /// `writev(fd, iov, iovcnt)` — each iovec is a 16-byte (base, len) pair in guest memory.
    fn sys_writev(&mut self, hart: &mut Hart, memory: &mut SparseMemory) {
        let (fd, iov, iovcnt) = (hart.x(A0), hart.x(A1), hart.x(A2));
        let mut total = 0u64;
        let mut bytes = Vec::new();
        for k in 0..iovcnt {
            let base = hart.read_imem(memory, iov + 16 * k, 8);
            let len = hart.read_imem(memory, iov + 16 * k + 8, 8);
            bytes.extend(self.read_buffer(hart, memory, base, len));
            total += len;
        }
        let Some(file) = self.fd_file(fd) else {
            hart.set_x(A0, u64::MAX);
            return;
        };
        match file.write_all(&bytes) {
            Ok(()) => hart.set_x(A0, total),
            Err(err) => {
                warn!("writev to guest fd {fd} failed: {err}");
                hart.set_x(A0, u64::MAX);
            }
        }
    }

    /// `readlinkat(dirfd, path, buf, bufsz)` — only `/proc/self/exe` resolves, to the program
    /// name.
    fn sys_readlinkat(&mut self, hart: &mut Hart, memory: &mut SparseMemory) {
        let path = self.read_string(hart, memory, hart.x(A1));
        if path != "/proc/self/exe" {
            hart.set_x(A0, 0);
            return;
        }
        let buf = hart.x(A2);
        let bufsz = hart.x(A3);
        let name = self.prog_name.clone();
        let count = (name.len() as u64).min(bufsz);
        for (k, byte) in name.bytes().take(count as usize).enumerate() {
            memory.write(buf + k as u64, 1, byte as u64);
        }
        hart.set_x(A0, count);
    }

    /// `fstat(fd, statbuf)` — fills only `st_mode` (offset 16) and `st_blksize` (offset 56) of
    /// the riscv64 `struct stat`. Guest fd 1 reports a character device so libc line-buffers it
    /// like a terminal.
    fn sys_fstat(&mut self, hart: &mut Hart, memory: &mut SparseMemory) {
        let (fd, statbuf) = (hart.x(A0), hart.x(A1));
        if statbuf == 0 {
            hart.set_x(A0, u64::MAX);
            return;
        }
        if fd == 1 {
            memory.write(statbuf + 16, 4, 0x2190);
            memory.write(statbuf + 56, 4, 8192);
            hart.set_x(A0, 0);
            return;
        }
        let Some(file) = self.fd_file(fd) else {
            hart.set_x(A0, u64::MAX);
            return;
        };
        match file.metadata() {
            Ok(metadata) => {
                #[cfg(unix)]
                {
                    use std::os::unix::fs::MetadataExt;
                    memory.write(statbuf + 16, 4, metadata.mode() as u64);
                    memory.write(statbuf + 56, 4, metadata.blksize());
                }
                #[cfg(not(unix))]
                let _ = metadata;
                hart.set_x(A0, 0);
            }
            Err(err) => {
                warn!("fstat of guest fd {fd} failed: {err}");
                hart.set_x(A0, u64::MAX);
            }
        }
    }

    /// `exit` / `exit_group` — record the status and stop the run.
    fn sys_exit(&mut self, hart: &mut Hart) {
        let status = hart.x(A0);
        if status != 0 {
            error!("program exited with non-zero status: {status}");
        }
        self.exited = true;
        self.exit_status = status;
    }

    /// `uname(buf)` — six UTS_LEN-byte fields; only sysname and release are populated.
    fn sys_uname(&mut self, hart: &mut Hart, memory: &mut SparseMemory) {
        let buf = hart.x(A0);
        if buf == 0 {
            hart.set_x(A0, u64::MAX);
            return;
        }
        for k in 0..6 * UTS_LEN {
            memory.write(buf + k, 1, 0);
        }
        for (k, byte) in "Linux".bytes().enumerate() {
            memory.write(buf + k as u64, 1, byte as u64);
        }
        for (k, byte) in "4.15.0".bytes().enumerate() {
            memory.write(buf + 2 * UTS_LEN + k as u64, 1, byte as u64);
        }
        hart.set_x(A0, 0);
    }

    /// Program-break adjustment. The request arrives in `a5`; zero queries the current top, a
    /// lower value is a shrink (no-op), and a higher one grows the heap by a fresh block
    /// `[top + 1, request]`.
    fn sys_sbrk(&mut self, hart: &mut Hart, memory: &mut SparseMemory) {
        let request = hart.x(A5);
        if request <= self.top_of_mem {
            hart.set_x(A0, self.top_of_mem);
            return;
        }
        let delta = request - self.top_of_mem;
        match memory.add_block(self.top_of_mem + 1, delta, None) {
            Ok(()) => {
                self.top_of_mem = request;
                hart.set_x(A0, self.top_of_mem);
            }
            Err(err) => {
                warn!("sbrk to {request:#x} failed: {err}");
                hart.set_x(A0, self.top_of_mem);
            }
        }
    }

    /// `mmap(addr, len, prot, flags, fd, offset)` — allocations come from the bump pointer.
    /// Anonymous mappings (flag 0x20) are zero-filled; file mappings copy the file contents at
    /// `offset` into the new block.
    fn sys_mmap(&mut self, hart: &mut Hart, memory: &mut SparseMemory) {
        let len = hart.x(A1);
        let flags = hart.x(A3);
        let va = self.mmap_base;

        let result = if flags & 0x20 != 0 {
            memory.add_block(va, len, None)
        } else {
            let fd = hart.x(A4);
            let offset = hart.x(A5);
            let Some(file) = self.fd_file(fd) else {
                hart.set_x(A0, u64::MAX);
                return;
            };
            let mut data = vec![0u8; len as usize];
            let read = file
                .seek(SeekFrom::Start(offset))
                .and_then(|_| file.read(&mut data));
            match read {
                Ok(_) => memory.add_block(va, len, Some(&data)),
                Err(err) => {
                    warn!("mmap of guest fd {fd} failed: {err}");
                    hart.set_x(A0, u64::MAX);
                    return;
                }
            }
        };

        match result {
            Ok(()) => {
                self.mmap_base += len.next_multiple_of(PAGE_SIZE);
                hart.set_x(A0, va);
            }
            Err(err) => {
                warn!("mmap of {len:#x} bytes at {va:#x} failed: {err}");
                hart.set_x(A0, u64::MAX);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (Host, Hart, SparseMemory) {
        let mut host = Host::new("guest".into());
        host.set_output_dir(std::env::temp_dir());
        (host, Hart::new(0), SparseMemory::new())
    }

    fn output_path(stream: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{stream}.{}", std::process::id()))
    }

    #[test]
    fn test_complete_env_builds_argv() {
        let (mut host, mut hart, mut memory) = fixture();
        host.add_arg("alpha".into());
        host.add_arg("beta".into());
        host.complete_env(&mut hart, &mut memory).unwrap();

        let sp = hart.x(Specifier::SP);
        assert_eq!(3, hart.x(A0));
        assert_eq!(sp, hart.x(A1));
        assert_eq!(3, memory.read(sp, 8));

        let argv0 = memory.read(sp + 8, 8);
        let argv1 = memory.read(sp + 16, 8);
        let argv2 = memory.read(sp + 24, 8);
        let read_str = |mut va: u64| {
            let mut s = String::new();
            loop {
                let b = memory.read(va, 1) as u8;
                if b == 0 {
                    break;
                }
                s.push(b as char);
                va += 1;
            }
            s
        };
        assert_eq!("guest", read_str(argv0));
        assert_eq!("alpha", read_str(argv1));
        assert_eq!("beta", read_str(argv2));
        // Each string slot is 16-byte aligned.
        assert_eq!(0, argv0 % 16);
        assert_eq!(16, argv1 - argv0);
    }

    #[test]
    fn test_write_syscall_lands_in_stdout_file() {
        let (mut host, mut hart, mut memory) = fixture();
        host.complete_env(&mut hart, &mut memory).unwrap();

        memory.add_block(0x5000, 16, Some(b"hello")).unwrap();
        hart.set_x(A7, 64);
        hart.set_x(A0, 1);
        hart.set_x(A1, 0x5000);
        hart.set_x(A2, 5);
        host.syscall(&mut hart, &mut memory);

        assert_eq!(5, hart.x(A0));
        let contents = std::fs::read(output_path("stdout")).unwrap();
        assert_eq!(b"hello", &contents[..]);
    }

    #[test]
    fn test_writev_gathers_iovecs() {
        let (mut host, mut hart, mut memory) = fixture();
        host.complete_env(&mut hart, &mut memory).unwrap();

        memory.add_block(0x6000, 64, None).unwrap();
        for (k, byte) in b"hi there".iter().enumerate() {
            memory.write(0x6000 + k as u64, 1, *byte as u64);
        }
        // iov[0] = ("hi ", 3), iov[1] = ("there", 5)
        memory.add_block(0x7000, 32, None).unwrap();
        memory.write(0x7000, 8, 0x6000);
        memory.write(0x7008, 8, 3);
        memory.write(0x7010, 8, 0x6003);
        memory.write(0x7018, 8, 5);

        hart.set_x(A7, 66);
        hart.set_x(A0, 2); // stderr this time
        hart.set_x(A1, 0x7000);
        hart.set_x(A2, 2);
        host.syscall(&mut hart, &mut memory);

        assert_eq!(8, hart.x(A0));
        let contents = std::fs::read(output_path("stderr")).unwrap();
        assert_eq!(b"hi there", &contents[..]);
    }

    #[test]
    fn test_exit_sets_flag_and_status() {
        let (mut host, mut hart, _memory) = fixture();
        hart.set_x(A7, 93);
        hart.set_x(A0, 17);
        let mut memory = SparseMemory::new();
        host.syscall(&mut hart, &mut memory);
        assert!(host.exited());
        assert_eq!(17, host.exit_status());
    }

    #[test]
    fn test_getuid_family_returns_three() {
        let (mut host, mut hart, mut memory) = fixture();
        for number in 174..=177 {
            hart.set_x(A7, number);
            hart.set_x(A0, 99);
            host.syscall(&mut hart, &mut memory);
            assert_eq!(3, hart.x(A0));
        }
    }

    #[test]
    fn test_unknown_syscall_returns_zero() {
        let (mut host, mut hart, mut memory) = fixture();
        hart.set_x(A7, 4000);
        hart.set_x(A0, 55);
        host.syscall(&mut hart, &mut memory);
        assert_eq!(0, hart.x(A0));
    }

    #[test]
    fn test_sbrk_protocol() {
        let (mut host, mut hart, mut memory) = fixture();
        host.top_of_mem = 0x2_0FFF;

        // Query: request 0 returns the current top.
        hart.set_x(A7, 214);
        hart.set_x(A5, 0);
        host.syscall(&mut hart, &mut memory);
        assert_eq!(0x2_0FFF, hart.x(A0));

        // Grow to 0x2_2000.
        hart.set_x(A5, 0x2_2000);
        host.syscall(&mut hart, &mut memory);
        assert_eq!(0x2_2000, hart.x(A0));
        assert_eq!(0x2_2000, host.top_of_mem);
        // The new range is readable and zeroed.
        assert_eq!(0, memory.read(0x2_1000, 8));

        // Shrink is a no-op.
        hart.set_x(A5, 0x100);
        host.syscall(&mut hart, &mut memory);
        assert_eq!(0x2_2000, hart.x(A0));
    }

    #[test]
    fn test_mmap_anonymous_bumps_pointer() {
        let (mut host, mut hart, mut memory) = fixture();
        let first = host.mmap_base;

        hart.set_x(A7, 222);
        hart.set_x(A1, 100); // len
        hart.set_x(A3, 0x22); // MAP_ANONYMOUS | MAP_PRIVATE
        host.syscall(&mut hart, &mut memory);
        assert_eq!(first, hart.x(A0));
        assert_eq!(0, memory.read(first, 8));

        host.syscall(&mut hart, &mut memory);
        assert_eq!(first + PAGE_SIZE, hart.x(A0));
    }

    #[test]
    fn test_uname_fields() {
        let (mut host, mut hart, mut memory) = fixture();
        memory.add_block(0x9000, 6 * UTS_LEN, None).unwrap();
        hart.set_x(A7, 160);
        hart.set_x(A0, 0x9000);
        host.syscall(&mut hart, &mut memory);
        assert_eq!(0, hart.x(A0));
        assert_eq!(b'L' as u64, memory.read(0x9000, 1));
        assert_eq!(b'4' as u64, memory.read(0x9000 + 2 * UTS_LEN, 1));
        assert_eq!(0, memory.read(0x9000 + UTS_LEN, 1));
    }

    #[test]
    fn test_readlinkat_proc_self_exe() {
        let (mut host, mut hart, mut memory) = fixture();
        memory.add_block(0x8000, 64, None).unwrap();
        // Path string "/proc/self/exe" in guest memory.
        memory.add_block(0x8800, 32, Some(b"/proc/self/exe\0")).unwrap();
        hart.set_x(A7, 78);
        hart.set_x(A1, 0x8800);
        hart.set_x(A2, 0x8000);
        hart.set_x(A3, 64);
        host.syscall(&mut hart, &mut memory);
        assert_eq!(5, hart.x(A0));
        assert_eq!(b'g' as u64, memory.read(0x8000, 1));
        assert_eq!(b't' as u64, memory.read(0x8004, 1));
    }

    #[test]
    fn test_fstat_stdout_is_chardev() {
        let (mut host, mut hart, mut memory) = fixture();
        memory.add_block(0xA000, 128, None).unwrap();
        hart.set_x(A7, 80);
        hart.set_x(A0, 1);
        hart.set_x(A1, 0xA000);
        host.syscall(&mut hart, &mut memory);
        assert_eq!(0, hart.x(A0));
        assert_eq!(0x2190, memory.read(0xA000 + 16, 4));
        assert_eq!(8192, memory.read(0xA000 + 56, 4));
    }

    #[test]
    fn test_fstat_null_buf_fails() {
        let (mut host, mut hart, mut memory) = fixture();
        hart.set_x(A7, 80);
        hart.set_x(A0, 1);
        hart.set_x(A1, 0);
        host.syscall(&mut hart, &mut memory);
        assert_eq!(u64::MAX, hart.x(A0));
    }

    #[test]
    fn test_openat_dev_tty_is_stdout() {
        let (mut host, mut hart, mut memory) = fixture();
        memory.add_block(0xB000, 16, Some(b"/dev/tty\0")).unwrap();
        hart.set_x(A7, 56);
        hart.set_x(A1, 0xB000);
        hart.set_x(A2, 1); // O_WRONLY
        host.syscall(&mut hart, &mut memory);
        assert_eq!(1, hart.x(A0));
    }

    #[test]
    fn test_load_elf_minimal_image() {
        // A minimal ELF64: header, one LOAD program header, and four bytes of segment data.
        let mut image = Vec::new();
        image.extend_from_slice(&[0x7F, b'E', b'L', b'F', 2, 1, 1, 0]);
        image.extend_from_slice(&[0; 8]);
        image.extend_from_slice(&2u16.to_le_bytes()); // e_type = EXEC
        image.extend_from_slice(&243u16.to_le_bytes()); // e_machine = RISC-V
        image.extend_from_slice(&1u32.to_le_bytes()); // e_version
        image.extend_from_slice(&0x1_0000u64.to_le_bytes()); // e_entry
        image.extend_from_slice(&64u64.to_le_bytes()); // e_phoff
        image.extend_from_slice(&0u64.to_le_bytes()); // e_shoff
        image.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        image.extend_from_slice(&64u16.to_le_bytes()); // e_ehsize
        image.extend_from_slice(&56u16.to_le_bytes()); // e_phentsize
        image.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
        image.extend_from_slice(&0u16.to_le_bytes()); // e_shentsize
        image.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
        image.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx
        assert_eq!(64, image.len());
        image.extend_from_slice(&1u32.to_le_bytes()); // p_type = LOAD
        image.extend_from_slice(&5u32.to_le_bytes()); // p_flags = R+X
        image.extend_from_slice(&120u64.to_le_bytes()); // p_offset
        image.extend_from_slice(&0x1_0000u64.to_le_bytes()); // p_vaddr
        image.extend_from_slice(&0x1_0000u64.to_le_bytes()); // p_paddr
        image.extend_from_slice(&4u64.to_le_bytes()); // p_filesz
        image.extend_from_slice(&8u64.to_le_bytes()); // p_memsz
        image.extend_from_slice(&0x1000u64.to_le_bytes()); // p_align
        assert_eq!(120, image.len());
        image.extend_from_slice(&[0xEF, 0xBE, 0xAD, 0xDE]);

        let path = std::env::temp_dir().join(format!("phobos-test-elf.{}", std::process::id()));
        std::fs::write(&path, &image).unwrap();

        let (mut host, mut hart, mut memory) = fixture();
        host.load_elf(&path, &mut hart, &mut memory).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(0x1_0000, hart.pc());
        assert_eq!(0xDEAD_BEEF, memory.read(0x1_0000, 4));
        // p_memsz tail is zero-filled, and the block extends to the alignment boundary.
        assert_eq!(0, memory.read(0x1_0004, 4));
        assert_eq!(0, memory.read(0x1_0FFF, 1));
        assert_eq!(0x1_0FFF, host.top_of_mem);
    }
}
