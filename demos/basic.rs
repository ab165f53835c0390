// This file is part of strand, a cooperative fiber scheduling library.
// Copyright (c) The strand developers
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Runs three fibers to completion: one that raises itself to the highest
//! priority, a Fibonacci printer and a table of squares.

use clap::{Parser, ValueEnum};
use log::LevelFilter;

use strand::{Config, Policy, Priority, Scheduler, Target, FIBER_STACK, MAX_FIBERS};

#[derive(Parser)]
#[command(name = "basic")]
#[command(about = "Interleave a few fibers on one thread", long_about = None)]
struct Cli {
  /// How a yield from the host picks the next fiber
  #[arg(long, value_enum, default_value_t = PolicyArg::Priority)]
  policy: PolicyArg,

  /// Bytes of stack per fiber
  #[arg(long, default_value_t = FIBER_STACK)]
  stack_size: usize,

  /// Maximum number of live fibers
  #[arg(long, default_value_t = MAX_FIBERS)]
  capacity: usize,

  /// Print scheduler logs to stderr (twice for trace)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
  Priority,
  RoundRobin,
}

impl From<PolicyArg> for Policy {
  fn from(policy: PolicyArg) -> Policy {
    match policy {
      PolicyArg::Priority => Policy::Priority,
      PolicyArg::RoundRobin => Policy::RoundRobin,
    }
  }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
  let cli = Cli::parse();

  let level = match cli.verbose {
    0 => LevelFilter::Off,
    1 => LevelFilter::Debug,
    _ => LevelFilter::Trace,
  };
  env_logger::Builder::new().filter_level(level).init();

  let config = Config::default()
    .with_policy(cli.policy.into())
    .with_stack_size(cli.stack_size)
    .with_capacity(cli.capacity);
  let sched = Scheduler::with_config(config);

  sched.spawn(|sched| {
    for i in 0..5 {
      println!("Hey, I'm fiber #1: {}", i);
      if let Err(err) = sched.nice(Target::Current, Some(Priority::HIGHEST)) {
        eprintln!("cannot raise priority: {}", err);
      }
      sched.yield_now();
    }
  })?;

  sched.spawn(|sched| {
    let mut fib = [0u64, 1];
    println!("fibonacci(0) = 0\nfibonacci(1) = 1");
    for i in 2..15 {
      let next = fib[0] + fib[1];
      println!("fibonacci({}) = {}", i, next);
      fib = [fib[1], next];
      sched.yield_now();
    }
  })?;

  sched.spawn(|sched| {
    for i in 0..10 {
      println!("{}*{} = {}", i, i, i * i);
      sched.yield_now();
    }
  })?;

  sched.wait_for_all();
  Ok(())
}
