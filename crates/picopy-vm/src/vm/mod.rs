// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The VM context and its embedder entry points.
//!
//! One [`Vm`] bundles everything a run needs: the heap, the platform, the
//! interned singletons, the builtins dict, the image directory and the
//! thread ring. Passing the context explicitly (instead of a process-wide
//! global) lets multiple VM instances coexist in one process.


#[cfg(not(any(test, feature = "std")))]
use alloc::vec::Vec;
#[cfg(any(test, feature = "std"))]
use std::vec::Vec;

use picopy_abi::{MemSpace, ReturnCode};

use crate::config::VmConfig;
use crate::error::{VmError, VmResult};
use crate::heap::Heap;
use crate::image::{self, ImageDir};
use crate::obj::{self, Ref, Singletons, frame, thread};
use crate::platform::Platform;

/// One virtual machine instance.
#[derive(Debug)]
pub struct Vm<P: Platform> {
    pub(crate) heap: Heap,
    pub(crate) plat: P,
    pub(crate) singletons: Singletons,
    pub(crate) builtins: Ref,
    pub(crate) img_dir: ImageDir,
    /// Runnable threads; round-robin order.
    pub(crate) threads: Vec<Ref>,
    /// Index of the currently executing thread.
    pub(crate) current: usize,
    /// Millisecond tick counter fed by the periodic entry point.
    pub(crate) ms_ticks: u32,
    us_accum: u32,
    pub(crate) exit_requested: bool,
    /// Kind of the most recent raise, for bare re-raise.
    pub(crate) last_raise: Option<ReturnCode>,
    /// Capture site of the most recent raise, for the error reporter.
    pub(crate) err_site: Option<VmError>,
}

impl<P: Platform> Vm<P> {
    /// Initialize a VM: set up the host, the heap, the singletons and the
    /// builtins dict, then index the image table at `image_addr`.
    pub fn init(
        config: VmConfig,
        mut plat: P,
        space: MemSpace,
        image_addr: u32,
    ) -> VmResult<Self> {
        plat.init()?;
        let mut heap = Heap::new(config.heap_size);
        let singletons = Singletons::init(&mut heap)?;
        let builtins = crate::builtins::init(&mut heap, &plat)?;
        let img_dir = image::scan(&plat, space, image_addr)?;
        Ok(Self {
            heap,
            plat,
            singletons,
            builtins,
            img_dir,
            threads: Vec::new(),
            current: 0,
            ms_ticks: 0,
            us_accum: 0,
            exit_requested: false,
            last_raise: None,
            err_site: None,
        })
    }

    /// Import and execute the named module to completion.
    ///
    /// The process-level outcome is the returned code byte: `Ok` after a
    /// normal run, otherwise the uncaught exception or fatal code. The
    /// host's error reporter sees the failure before this returns.
    pub fn run(&mut self, module_name: &[u8]) -> ReturnCode {
        let result = self.run_inner(module_name);
        self.teardown_threads();
        match result {
            Ok(()) => ReturnCode::Ok,
            Err(err) => {
                self.plat.report_error(&err);
                err.code
            }
        }
    }

    /// Release whatever threads an aborted run left behind, frame chains
    /// included, so a failed run still restores the heap.
    fn teardown_threads(&mut self) {
        while let Some(thr) = self.threads.pop() {
            let mut cur = thread::frame_of(&self.heap, thr);
            thread::set_frame(&mut self.heap, thr, Ref::NULL);
            while !cur.is_null() {
                let back = frame::back(&self.heap, cur);
                let _ = obj::release(&mut self.heap, cur);
                cur = back;
            }
            let _ = obj::release(&mut self.heap, thr);
        }
        self.current = 0;
    }

    fn run_inner(&mut self, module_name: &[u8]) -> VmResult<()> {
        let module = image::mod_import(
            &mut self.heap,
            &self.plat,
            &self.singletons,
            &self.img_dir,
            module_name,
        )?;
        let root = frame::new(&mut self.heap, &self.plat, &self.singletons, module);
        obj::release(&mut self.heap, module)?;
        let thr = thread::new(&mut self.heap, root?)?;
        self.threads.push(thr);
        crate::interp::interpret(self)
    }

    /// Periodic entry point; the host calls this with the elapsed
    /// microseconds since the last call.
    pub fn vm_periodic(&mut self, usecs_elapsed: u16) -> ReturnCode {
        self.us_accum += u32::from(usecs_elapsed);
        self.ms_ticks += self.us_accum / 1000;
        self.us_accum %= 1000;
        ReturnCode::Ok
    }

    /// Ask the VM to terminate: `EXIT` is raised in the running thread at
    /// the next opcode boundary.
    pub fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    /// The heap, for hosts implementing native functions.
    #[must_use]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// The platform instance.
    #[must_use]
    pub fn platform(&self) -> &P {
        &self.plat
    }

    /// Mutable access to the platform instance.
    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.plat
    }

    /// The interned singletons.
    #[must_use]
    pub fn singletons(&self) -> &Singletons {
        &self.singletons
    }

    /// Milliseconds accumulated through the periodic entry point.
    #[must_use]
    pub fn ms_ticks(&self) -> u32 {
        self.ms_ticks
    }

    /// The capture site of the most recent raise, if any.
    #[must_use]
    pub fn err_site(&self) -> Option<&VmError> {
        self.err_site.as_ref()
    }
}
