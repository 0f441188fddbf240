mod aliases;
mod breakpoints;
mod extensions;
mod history;
mod listing;
mod pager;
mod restart;
mod session;
mod stepping;
mod watches;
