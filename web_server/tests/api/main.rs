mod health_check;
mod helpers;
mod merge;
mod upload;
