mod common;
mod routing;
mod scheduling;
