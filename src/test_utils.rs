//! Recording fakes for the command channel and the hardware traits.
