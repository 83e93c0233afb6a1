//! Test fixtures: canned compiler output and host build configuration.

use std::collections::BTreeMap;

use crate::util::sysconfig::parse_makefile;

/// `g++ --version` banner for the given version.
pub fn gcc_version_output(version: &str) -> String {
    format!(
        "g++ (GCC) {}\n\
         Copyright (C) 2021 Free Software Foundation, Inc.\n\
         This is free software; see the source for copying conditions.  There is NO\n\
         warranty; not even for MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.\n",
        version
    )
}

/// `c++ --version` on an older macOS toolchain.
pub const APPLE_CLANG_VERSION_OUTPUT: &str = "\
Apple LLVM version 10.0.0 (clang-1000.11.45.5)
Target: x86_64-apple-darwin18.2.0
Thread model: posix
InstalledDir: /Library/Developer/CommandLineTools/usr/bin
";

/// `nvcc --version` from CUDA 12.1.
pub const NVCC_VERSION_OUTPUT: &str = "\
nvcc: NVIDIA (R) Cuda compiler driver
Copyright (c) 2005-2023 NVIDIA Corporation
Built on Tue_Feb__7_19:32:13_PST_2023
Cuda compilation tools, release 12.1, V12.1.66
Build cuda_12.1.r12.1/compiler.32415258_0
";

/// What ispc prints when compiling without `--target`.
pub const ISPC_TARGET_WARNING: &str = "\
Warning: No --target specified on command-line. Using default system target \"avx2-i32x8\".
Warning: No output file or header file name specified. Program will be compiled and warnings/errors will be issued, but no output will be generated.
";

/// Excerpt of a CPython build Makefile.
pub const HOST_MAKEFILE: &str = "\
# Generated automatically from Makefile.pre by makesetup.
VERSION=\t3.11
SOABI=\t\tcpython-311-x86_64-linux-gnu
EXT_SUFFIX=\t.cpython-311-x86_64-linux-gnu.so

prefix=\t\t/usr
exec_prefix=\t${prefix}
INCLUDEDIR=\t${prefix}/include
LIBDIR=\t\t$(exec_prefix)/lib
INCLUDEPY=\t$(INCLUDEDIR)/python$(VERSION)

CC=\t\tgcc -pthread
CXX=\t\tg++ -pthread
BASECFLAGS=\t-Wall -Wstrict-prototypes
OPT=\t\t-DNDEBUG -O3 \\
\t\t-U_FORTIFY_SOURCE
CFLAGS=\t\t$(BASECFLAGS) $(OPT)
CFLAGSFORSHARED=-fPIC
LIBS=\t\t-lcrypt -ldl  -lm -pthread
LDSHARED=\t$(CC) -shared
LINKFORSHARED=\t-Xlinker -export-dynamic
MODOBJS=\tModules/config.o Modules/main.o

all:\t\tbuild_all
";

/// Evaluated variables of [`HOST_MAKEFILE`].
pub fn host_vars() -> BTreeMap<String, String> {
    parse_makefile(HOST_MAKEFILE, |_| None)
}
