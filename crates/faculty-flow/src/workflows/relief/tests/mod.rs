mod common;
mod routing;
mod tokens;
