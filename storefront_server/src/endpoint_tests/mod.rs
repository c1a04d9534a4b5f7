mod helpers;
mod payments;
mod refunds;
mod webhook;
